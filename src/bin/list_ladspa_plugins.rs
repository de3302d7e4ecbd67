//! List LADSPA plugins
//!
//! Scans LADSPA_PATH (or the default directories) and prints every plugin
//! found, with its unique id, source library, and channel capability.

use std::path::PathBuf;

use clap::Parser;
use ladspa_host::catalog::{search_paths, PluginCatalog};

#[derive(Parser)]
#[command(about = "Scan for LADSPA plugins and list them")]
struct Args {
    /// Directories to scan instead of LADSPA_PATH / the defaults
    #[arg(long = "path")]
    paths: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let paths = if args.paths.is_empty() {
        search_paths()
    } else {
        args.paths
    };

    println!("LADSPA plugin scanner");
    println!("=====================\n");
    println!("Scanning:");
    for path in &paths {
        println!("  - {}", path.display());
    }
    println!();

    let catalog = PluginCatalog::scan_paths(&paths);
    if catalog.is_empty() {
        println!("No LADSPA plugins found.");
        return;
    }

    println!("Found {} plugin(s):\n", catalog.len());
    for (i, plugin) in catalog.plugins().iter().enumerate() {
        println!(
            "{}. {} ({})",
            i + 1,
            plugin.name,
            if plugin.stereo { "stereo" } else { "mono" }
        );
        println!("   Label: {}", plugin.label);
        println!("   ID: {}", plugin.unique_id);
        println!("   Path: {} [{}]", plugin.path.display(), plugin.slot);
        println!();
    }
}

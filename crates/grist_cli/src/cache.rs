//! The `grist cache` command: inspect and maintain the cache root.

use std::sync::Arc;

use grist_cache::{
    CacheManager, CacheSettings, CacheStats, ContentHasher, FileCacheManager, NullMeasure,
    PrunePolicy,
};
use grist_common::ContentHash;
use grist_config::resolve_paths;
use grist_pipeline::TOOL_VERSION;

use crate::project::load_project;
use crate::{CacheCommand, GlobalArgs, ReportFormat};

/// Runs a `grist cache` subcommand.
pub fn run(command: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let manager = open_cache(global)?;

    match command {
        CacheCommand::Clean => {
            manager.clean_cache()?;
            if !global.quiet {
                eprintln!("     Cleaned {}", manager.store().root().display());
            }
        }
        CacheCommand::Prune => {
            let report = manager.prune(PrunePolicy::Unreferenced)?;
            if !global.quiet {
                eprintln!(
                    "      Pruned {} sections, {} blobs",
                    report.sections_removed, report.blobs_removed
                );
            }
        }
        CacheCommand::Stats { format } => {
            let stats = manager.stats()?;
            println!("{}", format_stats(&stats, *format)?);
        }
        CacheCommand::List => {
            for manifest in manager.sections() {
                let results: usize = manifest.results.values().map(Vec::len).sum();
                println!(
                    "{}  {}  {} results, {} dependencies",
                    manifest.fingerprint,
                    manifest.id,
                    results,
                    manifest.dependencies.len()
                );
            }
        }
        CacheCommand::Lookup { fingerprint } => {
            let fingerprint: ContentHash = fingerprint.parse()?;
            match manager.lookup(&fingerprint) {
                Some(manifest) => println!("{}", serde_json::to_string_pretty(&manifest)?),
                None => {
                    eprintln!("error: no cached section {fingerprint}");
                    return Ok(1);
                }
            }
        }
    }
    Ok(0)
}

/// Opens the cache root of the current project, whether or not caching is
/// enabled for builds.
fn open_cache(global: &GlobalArgs) -> Result<FileCacheManager, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let paths = resolve_paths(&config, &project_dir)?;
    let settings = CacheSettings::new(&paths.cache_root, &paths.destination, TOOL_VERSION);
    Ok(FileCacheManager::new(
        settings,
        Arc::new(ContentHasher::new()),
        Arc::new(NullMeasure),
    )?)
}

fn format_stats(
    stats: &CacheStats,
    format: ReportFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ReportFormat::Text => format!(
            "sections: {} ({} bytes)\nblobs:    {} ({} bytes)",
            stats.sections, stats.section_bytes, stats.blobs, stats.blob_bytes
        ),
        ReportFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "sections": stats.sections,
            "section_bytes": stats.section_bytes,
            "blobs": stats.blobs,
            "blob_bytes": stats.blob_bytes,
        }))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_formats() {
        let stats = CacheStats {
            sections: 2,
            section_bytes: 300,
            blobs: 5,
            blob_bytes: 4096,
        };
        let text = format_stats(&stats, ReportFormat::Text).unwrap();
        assert!(text.starts_with("sections: 2 (300 bytes)"));

        let json: serde_json::Value =
            serde_json::from_str(&format_stats(&stats, ReportFormat::Json).unwrap()).unwrap();
        assert_eq!(json["blobs"], 5);
        assert_eq!(json["blob_bytes"], 4096);
    }

    #[test]
    fn lookup_unknown_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("grist.toml"), "[project]\nname = \"t\"\n").unwrap();
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };
        let missing = CacheCommand::Lookup {
            fingerprint: "0".repeat(64),
        };
        assert_eq!(run(&missing, &global).unwrap(), 1);

        let bad = CacheCommand::Lookup {
            fingerprint: "xyz".to_string(),
        };
        assert!(run(&bad, &global).is_err());
        assert_eq!(run(&CacheCommand::Clean, &global).unwrap(), 0);
    }
}

//! Command-line interface for the grist web asset builder.
//!
//! Provides `grist build` for incremental builds of style sheets, scripts and
//! images, and `grist cache` for inspecting and maintaining the cache root.

#![warn(missing_docs)]

mod build;
mod cache;
mod project;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the log filter.
const LOG_ENV: &str = "GRIST_LOG";

/// Incremental, content-addressed web asset builds.
#[derive(Parser, Debug)]
#[command(name = "grist", version, about = "Grist web asset builder")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `grist.toml` configuration file or project directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build every file type of the current project.
    Build(BuildArgs),
    /// Inspect or maintain the cache root.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `grist build` subcommand.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// Empty the cache root before building.
    #[arg(long)]
    pub clean: bool,

    /// Delete the destination and log directories before building.
    #[arg(long)]
    pub clean_destination: bool,

    /// Build without reading or writing the cache.
    #[arg(long, conflicts_with = "clean")]
    pub no_cache: bool,

    /// Print per-section timings after the build.
    #[arg(long)]
    pub measure: bool,

    /// After a successful build, remove cache entries it did not use.
    #[arg(long, conflicts_with = "no_cache")]
    pub prune: bool,
}

/// `grist cache` subcommands.
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Delete every cache entry.
    Clean,
    /// Remove unreadable sections and unreferenced content.
    Prune,
    /// Show the number and size of cache entries.
    Stats {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
    /// List cached sections.
    List,
    /// Show the cached record of one section.
    Lookup {
        /// Section fingerprint (64 hex characters).
        fingerprint: String,
    },
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file or project directory.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Build(ref args) => build::run(args, &global),
        Command::Cache(ref command) => cache::run(command, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Installs the stderr log subscriber. `GRIST_LOG` takes precedence over the
/// verbosity flags.
fn init_tracing(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(default_filter(global.quiet, global.verbose))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn default_filter(quiet: bool, verbose: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "grist_cache=debug,grist_pipeline=debug,warn"
    } else {
        "warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_build_default() {
        let cli = Cli::parse_from(["grist", "build"]);
        match cli.command {
            Command::Build(ref args) => {
                assert!(!args.clean);
                assert!(!args.clean_destination);
                assert!(!args.no_cache);
                assert!(!args.measure);
                assert!(!args.prune);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn parse_build_with_args() {
        let cli = Cli::parse_from([
            "grist",
            "build",
            "--clean",
            "--clean-destination",
            "--measure",
            "--prune",
        ]);
        match cli.command {
            Command::Build(ref args) => {
                assert!(args.clean);
                assert!(args.clean_destination);
                assert!(args.measure);
                assert!(args.prune);
            }
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn no_cache_conflicts_with_prune() {
        let result = Cli::try_parse_from(["grist", "build", "--no-cache", "--prune"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_cache_subcommands() {
        let cli = Cli::parse_from(["grist", "cache", "stats", "--format", "json"]);
        match cli.command {
            Command::Cache(CacheCommand::Stats { format }) => {
                assert_eq!(format, ReportFormat::Json);
            }
            _ => panic!("expected cache stats"),
        }

        let cli = Cli::parse_from(["grist", "cache", "lookup", "abc"]);
        match cli.command {
            Command::Cache(CacheCommand::Lookup { ref fingerprint }) => {
                assert_eq!(fingerprint, "abc");
            }
            _ => panic!("expected cache lookup"),
        }

        assert!(matches!(
            Cli::parse_from(["grist", "cache", "prune"]).command,
            Command::Cache(CacheCommand::Prune)
        ));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::parse_from(["grist", "--quiet", "--config", "site/grist.toml", "build"]);
        assert!(cli.quiet);
        assert!(!cli.verbose);
        assert_eq!(cli.config.as_deref(), Some("site/grist.toml"));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["grist", "cache", "list", "-v"]);
        assert!(cli.verbose);
    }

    #[test]
    fn filter_follows_flags() {
        assert_eq!(default_filter(true, true), "error");
        assert!(default_filter(false, true).contains("grist_cache=debug"));
        assert_eq!(default_filter(false, false), "warn");
    }
}

//! The `grist build` command.

use grist_cache::{PrunePolicy, SectionState};
use grist_common::WorkOutcome;
use grist_pipeline::{run_build, BuildContext, BuildReport};
use tracing::debug;

use crate::project::load_project;
use crate::{BuildArgs, GlobalArgs};

/// Runs the `grist build` command.
///
/// Command-line flags override the `[cache]` settings of `grist.toml`.
/// Returns exit code 0 when every file type built, 1 otherwise.
pub fn run(args: &BuildArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, mut config) = load_project(global)?;
    config.cache.clean |= args.clean;
    config.cache.clean_destination |= args.clean_destination;
    config.cache.measure |= args.measure;
    if args.no_cache {
        config.cache.enabled = false;
    }
    debug!(project_dir = %project_dir.display(), cache = ?config.cache, "project loaded");

    if !global.quiet {
        eprintln!(
            "   Building {} ({})",
            config.project.name, config.project.config_type
        );
    }

    let ctx = BuildContext::new(config, &project_dir)?;
    let report = run_build(&ctx)?;

    if !global.quiet {
        print_report(&report);
    }
    for issue in report.issues() {
        eprintln!("warning: {issue}");
    }
    if args.measure && !global.quiet {
        print_timings(&report);
    }

    if !report.succeeded() {
        eprintln!("error: build failed");
        return Ok(1);
    }

    if args.prune {
        let pruned = ctx.cache().prune(PrunePolicy::UnusedThisSession)?;
        if !global.quiet {
            eprintln!(
                "      Pruned {} sections, {} blobs",
                pruned.sections_removed, pruned.blobs_removed
            );
        }
    }

    if !global.quiet {
        eprintln!("    Finished in {:.2}s", report.elapsed.as_secs_f64());
    }
    Ok(0)
}

fn print_report(report: &BuildReport) {
    for file_type in &report.file_types {
        eprintln!(
            "   {:>8} {} ({} outputs)",
            file_type.file_type.section_name(),
            describe(file_type.state, &file_type.outcome),
            file_type.outputs
        );
        for set in &file_type.file_sets {
            let state = set
                .state
                .map(|s| describe(s, &set.outcome))
                .unwrap_or("not built");
            eprintln!("            {} {state}", set.name);
        }
    }
}

fn describe(state: SectionState, outcome: &WorkOutcome) -> &'static str {
    if !outcome.is_cacheable() {
        return "failed";
    }
    match state {
        SectionState::Skipped => "up to date",
        SectionState::Restored => "restored from cache",
        SectionState::Saved => "built",
        SectionState::Created => "built (not cached)",
    }
}

fn print_timings(report: &BuildReport) {
    eprintln!("     Timings:");
    for t in &report.timings {
        eprintln!(
            "       {:>9.3}ms  x{:<3} {}",
            t.total.as_secs_f64() * 1000.0,
            t.count,
            t.name
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grist_common::{IssueCode, WorkIssue};

    #[test]
    fn describe_states() {
        assert_eq!(describe(SectionState::Skipped, &WorkOutcome::Completed), "up to date");
        assert_eq!(describe(SectionState::Saved, &WorkOutcome::Completed), "built");
        let failed = WorkOutcome::Failed(WorkIssue::new(IssueCode::MissingInput, "x"));
        assert_eq!(describe(SectionState::Created, &failed), "failed");
    }

    #[test]
    fn build_command_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.js"), "main();").unwrap();
        std::fs::write(
            dir.path().join("grist.toml"),
            "[project]\nname = \"t\"\n[[js]]\nname = \"app\"\ninputs = [\"js/app.js\"]\noutput = \"app.js\"\n",
        )
        .unwrap();

        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().display().to_string()),
        };
        let args = BuildArgs {
            clean: false,
            clean_destination: false,
            no_cache: false,
            measure: false,
            prune: true,
        };
        assert_eq!(run(&args, &global).unwrap(), 0);
        assert!(dir.path().join("out/statics/js_log.json").is_file());
        assert_eq!(run(&args, &global).unwrap(), 0);
    }
}

//! Explicit outcomes returned by activities to the cache layer.
//!
//! The cache only persists a section whose work completed. Activities report
//! validation problems as values instead of panicking, so the caller can tell
//! "failed, do not cache" apart from "completed with a warning".

use std::fmt;

/// Reason code for a reported issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueCode {
    /// The same name was declared twice (e.g. duplicate file set names).
    DuplicateDeclaration,
    /// A configured output path is unusable (e.g. no file extension).
    InvalidOutput,
    /// A required input does not exist.
    MissingInput,
    /// A resource token could not be resolved.
    UnresolvedToken,
    /// A locale or theme resource file could not be parsed.
    InvalidResource,
    /// A file includes itself, directly or through other includes.
    IncludeCycle,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssueCode::DuplicateDeclaration => "duplicate-declaration",
            IssueCode::InvalidOutput => "invalid-output",
            IssueCode::MissingInput => "missing-input",
            IssueCode::UnresolvedToken => "unresolved-token",
            IssueCode::InvalidResource => "invalid-resource",
            IssueCode::IncludeCycle => "include-cycle",
        };
        f.write_str(name)
    }
}

/// A single issue raised by an activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkIssue {
    /// Machine-readable reason code.
    pub code: IssueCode,
    /// Human-readable description.
    pub message: String,
}

impl WorkIssue {
    /// Creates a new issue.
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for WorkIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// What happened when an activity ran inside a cache section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkOutcome {
    /// The work finished cleanly.
    Completed,
    /// The work finished but reported non-fatal issues.
    CompletedWithWarnings(Vec<WorkIssue>),
    /// The work did not finish; its results must not be cached.
    Failed(WorkIssue),
}

impl WorkOutcome {
    /// Returns `true` if the section's results may be persisted.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, WorkOutcome::Failed(_))
    }

    /// Issues reported by the work, if any.
    pub fn issues(&self) -> &[WorkIssue] {
        match self {
            WorkOutcome::Completed => &[],
            WorkOutcome::CompletedWithWarnings(issues) => issues,
            WorkOutcome::Failed(issue) => std::slice::from_ref(issue),
        }
    }

    /// Combines two outcomes: failure wins, warnings accumulate.
    pub fn and(self, other: WorkOutcome) -> WorkOutcome {
        match (self, other) {
            (WorkOutcome::Failed(issue), _) | (_, WorkOutcome::Failed(issue)) => {
                WorkOutcome::Failed(issue)
            }
            (WorkOutcome::Completed, o) | (o, WorkOutcome::Completed) => o,
            (
                WorkOutcome::CompletedWithWarnings(mut a),
                WorkOutcome::CompletedWithWarnings(b),
            ) => {
                a.extend(b);
                WorkOutcome::CompletedWithWarnings(a)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_is_not_cacheable() {
        let failed = WorkOutcome::Failed(WorkIssue::new(IssueCode::InvalidOutput, "no ext"));
        assert!(!failed.is_cacheable());
        assert!(WorkOutcome::Completed.is_cacheable());
        assert!(WorkOutcome::CompletedWithWarnings(vec![]).is_cacheable());
    }

    #[test]
    fn and_accumulates_warnings() {
        let a = WorkOutcome::CompletedWithWarnings(vec![WorkIssue::new(
            IssueCode::UnresolvedToken,
            "a",
        )]);
        let b = WorkOutcome::CompletedWithWarnings(vec![WorkIssue::new(
            IssueCode::UnresolvedToken,
            "b",
        )]);
        assert_eq!(a.and(b).issues().len(), 2);
    }

    #[test]
    fn and_failure_wins() {
        let warn = WorkOutcome::CompletedWithWarnings(vec![]);
        let failed = WorkOutcome::Failed(WorkIssue::new(IssueCode::MissingInput, "gone"));
        assert!(!warn.and(failed).is_cacheable());
        assert_eq!(
            WorkOutcome::Completed.and(WorkOutcome::Completed),
            WorkOutcome::Completed
        );
    }

    #[test]
    fn issue_display() {
        let issue = WorkIssue::new(IssueCode::DuplicateDeclaration, "set 'site' declared twice");
        assert_eq!(issue.to_string(), "[duplicate-declaration] set 'site' declared twice");
    }
}

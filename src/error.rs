//! Error taxonomy for the engine (spec.md §7).
//!
//! A caught exception from `real_command` is *data*, carried inside
//! [`crate::handle::Outcome::CaughtException`] — it is not one of these variants. The
//! variants here are the engine's own failure/fatal signals.

use crate::handle::Handle;
use crate::report::Report;

/// Errors the engine itself can raise.
///
/// [`LinearCheckError::NoValidInterleaving`] is the sole *failure* signal surfaced to the
/// external property harness (spec.md §7); everything else is either fatal
/// ([`LinearCheckError::UnboundHandle`]) or a configuration-time mistake.
#[derive(Debug, thiserror::Error)]
pub enum LinearCheckError {
    /// No interleaving of the program satisfied every postcondition and the terminal
    /// invariant. Carries both the sequential and parallel traces for reporting.
    #[error("no valid interleaving satisfies all postconditions\n{report}")]
    NoValidInterleaving { report: Box<Report> },

    /// A handle was referenced in an argument tree but never bound. Well-formedness checks
    /// in the generator and shrinker are supposed to make this unreachable; if it happens
    /// anyway it is an engine invariant violation, not suppressed.
    #[error("internal invariant violated: handle {0} was never bound")]
    UnboundHandle(Handle),

    /// A named command does not exist in the command table.
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    /// `setup` failed; the program cannot run at all.
    #[error("setup failed: {0}")]
    SetupFailed(#[source] anyhow::Error),

    /// `cleanup` failed on an attempt that otherwise passed, so there is no existing
    /// [`Report`] to attach the error to as a note (spec.md §7: cleanup errors "do not
    /// mask the original failure" — when there *is* one, the note is attached to its
    /// report instead of raised as this variant).
    #[error("cleanup failed: {0}")]
    CleanupFailed(#[source] anyhow::Error),

    /// The program did not complete within its configured wall-clock budget.
    #[error("program exceeded timeout of {0:?}")]
    Timeout(std::time::Duration),

    /// The spec configuration (e.g. a malformed TOML options file) was invalid.
    #[error("invalid configuration: {0}")]
    Config(#[source] anyhow::Error),
}

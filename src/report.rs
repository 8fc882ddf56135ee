//! Reporting surface (spec.md §6).
//!
//! A failure report lists, for the sequential prefix and each parallel thread, one line per
//! invocation: `handle " = " (name args...) " = " result_or_exception_snapshot`, with a note
//! appended when a value's later string form differs from the snapshot taken immediately
//! after execution ("object may have been mutated later"). Threads are labelled `A, B, …`.

use std::fmt;

use crate::handle::{Handle, Outcome};
use crate::program::{Invocation, Program};

/// An invocation's display form: handle, command name, and the already-`{:?}`-rendered
/// argument tree, so [`Report`] itself carries no generic parameter.
#[derive(Debug, Clone)]
pub struct RenderedInvocation {
    pub handle: Handle,
    pub command: String,
    pub args_debug: String,
}

/// One executed (or attempted) step, ready to be rendered.
#[derive(Debug, Clone)]
pub struct StepRecord<V> {
    pub invocation: RenderedInvocation,
    /// `None` if the step was never reached (e.g. an earlier step in the same thread threw).
    pub outcome: Option<Outcome<V>>,
    /// Current `{:?}` form of the value, captured at report time; compared against the
    /// snapshot inside `outcome` to detect later mutation.
    pub current_snapshot: Option<String>,
}

/// A full execution/linearization trace, ready for display.
#[derive(Debug, Clone)]
pub struct Report {
    pub sequential: Vec<StepRecord<String>>,
    pub parallel: Vec<Vec<StepRecord<String>>>,
    pub note: Option<String>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sequential:")?;
        for step in &self.sequential {
            writeln!(f, "  {}", render_step(step))?;
        }
        for (i, thread) in self.parallel.iter().enumerate() {
            writeln!(f, "thread {}:", thread_label(i))?;
            for step in thread {
                writeln!(f, "  {}", render_step(step))?;
            }
        }
        if let Some(note) = &self.note {
            writeln!(f, "note: {note}")?;
        }
        Ok(())
    }
}

/// Render `A, B, C, ...` for thread index 0, 1, 2, ... (spec.md §6: "Thread labels are
/// letters A, B, …").
pub fn thread_label(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

fn render_step(step: &StepRecord<String>) -> String {
    let lhs = format!(
        "{} = {}({})",
        step.invocation.handle, step.invocation.command, step.invocation.args_debug
    );
    match &step.outcome {
        None => format!("{lhs}  (not reached)"),
        Some(Outcome::CaughtException(msg)) => format!("{lhs} = <exception: {msg}>"),
        Some(Outcome::Value(_, snapshot)) => {
            let mutated = step
                .current_snapshot
                .as_ref()
                .map(|now| now != snapshot)
                .unwrap_or(false);
            if mutated {
                format!(
                    "{lhs} = {snapshot}  (object may have been mutated later: now {})",
                    step.current_snapshot.as_deref().unwrap_or("")
                )
            } else {
                format!("{lhs} = {snapshot}")
            }
        }
    }
}

/// Build a display-ready [`Report`] from a program and the outcomes bound for each handle,
/// re-deriving the `Debug` string for each argument tree as `{:?}`-formatted text so the
/// report itself has no generic parameter to thread through the rest of the engine.
pub fn build_report<V: fmt::Debug + Clone>(
    program: &Program<V>,
    outcomes: &std::collections::HashMap<crate::handle::Handle, Outcome<V>>,
    note: Option<String>,
) -> Report {
    let to_steps = |invocations: &[Invocation<V>]| -> Vec<StepRecord<String>> {
        invocations
            .iter()
            .map(|inv| {
                let outcome = outcomes.get(&inv.handle).cloned();
                let current_snapshot = outcome.as_ref().and_then(|o| match o {
                    Outcome::Value(v, _) => Some(format!("{v:?}")),
                    Outcome::CaughtException(_) => None,
                });
                StepRecord {
                    invocation: RenderedInvocation {
                        handle: inv.handle,
                        command: inv.command.clone(),
                        args_debug: format!("{:?}", inv.args),
                    },
                    outcome: outcome.map(|o| match o {
                        Outcome::Value(v, snap) => Outcome::Value(format!("{v:?}"), snap),
                        Outcome::CaughtException(e) => Outcome::CaughtException(e),
                    }),
                    current_snapshot,
                }
            })
            .collect()
    };

    Report {
        sequential: to_steps(&program.sequential),
        parallel: program.parallel.iter().map(|t| to_steps(t)).collect(),
        note,
    }
}

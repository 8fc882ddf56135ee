//! Execution runner (C6).
//!
//! Executes a fully generated (and possibly shrunk) [`Program`] against the real system:
//! the sequential prefix first, then — if the program has parallel threads — each thread
//! concurrently on its own OS thread via [`std::thread::scope`] (spec.md §5: the runner's
//! parallel phase is the only place real concurrency appears in this engine; generation,
//! shrinking, and linearization are all single-threaded and pure).
//!
//! A `real_command` that panics is caught with [`std::panic::catch_unwind`] and turned into
//! [`Outcome::CaughtException`] rather than unwinding through the harness; an explicit
//! `Err(String)` return is treated the same way, since both mean "the system rejected this
//! call" from the model's point of view. Once an invocation in a thread throws, every later
//! invocation in that same thread that (transitively) references its handle is left
//! unbound and so never attempted — `execute_sequence` simply stops, and [`crate::report`]
//! renders the gap as "not reached".

use std::panic::{self, AssertUnwindSafe};

use crate::command::Spec;
use crate::handle::{Bindings, Handle, Outcome};
use crate::program::{Invocation, Program};

/// Run every invocation of `program` against `spec`'s real commands and return the
/// resulting [`Bindings`] — one [`Outcome`] per handle that was reached.
///
/// `setup_value`, if present, is pre-bound to [`Handle::SETUP`] so later invocations can
/// reference it like any other handle.
pub fn execute_program<S, V>(
    spec: &Spec<S, V>,
    program: &Program<V>,
    setup_value: Option<&V>,
) -> Bindings<V>
where
    S: 'static,
    V: Clone + std::fmt::Debug + Send + Sync + 'static,
{
    let mut bindings = Bindings::new();
    if let Some(value) = setup_value {
        let snapshot = format!("{value:?}");
        bindings.bind(Handle::SETUP, Outcome::Value(value.clone(), snapshot));
    }

    execute_sequence(spec, &program.sequential, &mut bindings);

    if program.parallel.is_empty() {
        return bindings;
    }

    let thread_locals: Vec<Bindings<V>> = std::thread::scope(|scope| {
        let joins: Vec<_> = program
            .parallel
            .iter()
            .map(|thread_invocations| {
                let mut local = bindings.clone();
                scope.spawn(move || {
                    execute_sequence(spec, thread_invocations, &mut local);
                    local
                })
            })
            .collect();
        joins
            .into_iter()
            .map(|j| j.join().expect("a runner thread panicked outside of real_command"))
            .collect()
    });

    for (thread_invocations, local) in program.parallel.iter().zip(thread_locals) {
        for invocation in thread_invocations {
            if let Some(outcome) = local.get(invocation.handle) {
                bindings.bind(invocation.handle, outcome.clone());
            }
        }
    }

    bindings
}

/// Execute `invocations` strictly in order, stopping as soon as one cannot be run because
/// an argument references a handle with no binding (the preceding step in this same
/// sequence threw, or — unreachably, given well-formedness — a generator/shrinker defect).
fn execute_sequence<S, V>(spec: &Spec<S, V>, invocations: &[Invocation<V>], bindings: &mut Bindings<V>)
where
    S: 'static,
    V: Clone + std::fmt::Debug + 'static,
{
    for invocation in invocations {
        let Ok(args) = bindings.substitute(&invocation.args) else { break };
        let Ok(command) = spec.command(&invocation.command) else { break };
        tracing::info!(handle = %invocation.handle, command = %invocation.command, "invoking real command");
        let outcome = run_catching(|| (command.real_command)(&args));
        if let Outcome::CaughtException(ref message) = outcome {
            tracing::warn!(
                handle = %invocation.handle,
                command = %invocation.command,
                error = %message,
                "real command raised a caught exception"
            );
        }
        bindings.bind(invocation.handle, outcome);
    }
}

fn run_catching<V: std::fmt::Debug>(f: impl FnOnce() -> Result<V, String>) -> Outcome<V> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            let snapshot = format!("{value:?}");
            Outcome::Value(value, snapshot)
        }
        Ok(Err(message)) => Outcome::CaughtException(message),
        Err(payload) => Outcome::CaughtException(panic_message(&payload)),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "real_command panicked with a non-string payload".to_string()
    }
}

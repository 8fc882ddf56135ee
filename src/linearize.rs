//! Linearizability checker (C7).
//!
//! Given a program, its captured execution results, and the initial bindings, searches for
//! at least one valid interleaving of the parallel suffix whose model trajectory satisfies
//! every `real_postcondition` and the terminal `spec_postcondition` (spec.md §4.7). The
//! engine does not attempt minimum-interleaving detection — any accepting interleaving
//! ends the search.
//!
//! The sequential prefix is walked once, since every interleaving shares the same prefix
//! and a prefix failure (a caught exception or a false postcondition) dooms every
//! interleaving alike (spec.md §4.7's tie-break: "If any invocation in the sequential
//! prefix threw, no interleaving can be valid ⇒ fail immediately").

use std::fmt;

use crate::command::{ResultRef, Spec};
use crate::error::LinearCheckError;
use crate::handle::{Bindings, Outcome};
use crate::program::{Invocation, Program};

/// Interleavings beyond this many parallel threads are not enumerated; spec.md §4.7 calls
/// out capping `T` "for implementation sanity".
pub const MAX_PARALLEL_THREADS: usize = 4;

/// Accept `program` iff some interleaving of its parallel suffix, combined with the
/// already-walked sequential prefix, satisfies every postcondition and the terminal
/// invariant. `execution` holds the real outcomes captured by [`crate::runner`];
/// `setup_value` seeds both the model's initial state and handle `#<0>`.
pub fn linearize<S, V>(
    spec: &Spec<S, V>,
    program: &Program<V>,
    execution: &Bindings<V>,
    setup_value: Option<&V>,
) -> Result<(), LinearCheckError>
where
    S: Clone + 'static,
    V: Clone + fmt::Debug + 'static,
{
    if program.parallel.len() > MAX_PARALLEL_THREADS {
        return Err(LinearCheckError::Config(anyhow::anyhow!(
            "program has {} parallel threads, more than the supported maximum of {}",
            program.parallel.len(),
            MAX_PARALLEL_THREADS
        )));
    }

    let initial_state = spec.initial_state(setup_value);
    let mut initial_bindings = Bindings::new();
    if let Some(value) = setup_value {
        initial_bindings.bind(crate::handle::Handle::SETUP, Outcome::Value(value.clone(), String::new()));
    }

    let Some((prefix_state, prefix_bindings)) =
        walk_steps(spec, &program.sequential, execution, initial_state, initial_bindings)
    else {
        return Err(build_failure(
            program,
            execution,
            "a step in the sequential prefix threw or violated its postcondition; no interleaving can succeed",
        ));
    };

    let thread_slices: Vec<&[Invocation<V>]> = program.parallel.iter().map(Vec::as_slice).collect();
    for (index, interleaving) in enumerate_interleavings(&thread_slices).into_iter().enumerate() {
        let state = prefix_state.clone();
        let bindings = prefix_bindings.clone();
        if let Some((final_state, _)) = walk_interleaving(spec, &interleaving, execution, state, bindings) {
            if spec.check_spec_postcondition(&final_state) {
                tracing::info!(interleaving = index, "accepted interleaving satisfies all postconditions");
                return Ok(());
            }
        }
        tracing::debug!(interleaving = index, "interleaving rejected");
    }

    Err(build_failure(program, execution, "no interleaving satisfied every postcondition"))
}

/// Walk a chosen interleaving — a flat list of `(thread_index, invocation)` pairs in the
/// order they are to be committed — starting from `state`/`bindings` already advanced past
/// the sequential prefix.
fn walk_interleaving<S, V>(
    spec: &Spec<S, V>,
    interleaving: &[(usize, &Invocation<V>)],
    execution: &Bindings<V>,
    state: S,
    bindings: Bindings<V>,
) -> Option<(S, Bindings<V>)>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let invocations: Vec<Invocation<V>> = interleaving.iter().map(|(_, inv)| (*inv).clone()).collect();
    walk_steps(spec, &invocations, execution, state, bindings)
}

/// Replay `invocations` against `execution`'s already-captured results, advancing `state`
/// and `bindings` one step at a time. Returns `None` the moment a step is invalid: its
/// result was a caught exception, its arguments reference an unbound handle, or its
/// `real_postcondition` rejects the transition.
fn walk_steps<S, V>(
    spec: &Spec<S, V>,
    invocations: &[Invocation<V>],
    execution: &Bindings<V>,
    mut state: S,
    mut bindings: Bindings<V>,
) -> Option<(S, Bindings<V>)>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    for invocation in invocations {
        let outcome = execution.get(invocation.handle)?;
        let Outcome::Value(result, snapshot) = outcome else {
            return None;
        };
        let args = bindings.substitute(&invocation.args).ok()?;
        let command = spec.command(&invocation.command).ok()?;

        let prev_state = state.clone();
        let next_state = (command.model_next_state)(&state, &args, ResultRef::Concrete(result));
        if !(command.real_postcondition)(&prev_state, &next_state, &args, result) {
            return None;
        }

        state = next_state;
        bindings.bind(invocation.handle, Outcome::Value(result.clone(), snapshot.clone()));
    }
    Some((state, bindings))
}

/// Every total order over `threads` that respects each thread's own internal order,
/// enumerated in a fixed (lowest-thread-index-first) order so that re-running the same
/// program always tries interleavings in the same sequence (spec.md §4.7: "the interleaver
/// must enumerate in a fixed order so shrinking is reproducible").
fn enumerate_interleavings<'a, T>(threads: &[&'a [T]]) -> Vec<Vec<(usize, &'a T)>> {
    if threads.iter().all(|t| t.is_empty()) {
        return vec![Vec::new()];
    }

    let mut results = Vec::new();
    for i in 0..threads.len() {
        if threads[i].is_empty() {
            continue;
        }
        let mut rest: Vec<&[T]> = threads.to_vec();
        let head = &rest[i][0];
        rest[i] = &rest[i][1..];
        for mut tail in enumerate_interleavings(&rest) {
            tail.insert(0, (i, head));
            results.push(tail);
        }
    }
    results
}

fn build_failure<S, V>(program: &Program<V>, execution: &Bindings<V>, note: &str) -> LinearCheckError
where
    V: Clone + fmt::Debug,
{
    let report = crate::report::build_report(program, execution.as_map(), Some(note.to_string()));
    LinearCheckError::NoValidInterleaving { report: Box::new(report) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argspec::{ArgSpec, ArgTree};
    use crate::command::Command;
    use crate::handle::HandleCounter;

    #[derive(Clone, Debug)]
    struct QueueModel {
        elements: Vec<i64>,
    }

    fn queue_spec() -> Spec<QueueModel, i64> {
        Spec::new(|_| QueueModel { elements: Vec::new() })
            .with_command(
                Command::new(
                    "push",
                    |_state: &QueueModel| ArgSpec::Gen(proptest::prelude::any::<i64>().boxed()),
                    |_args| Ok(0),
                )
                .with_next_state(|state: &QueueModel, args, _result| {
                    let mut next = state.clone();
                    if let ArgTree::Literal(v) = args {
                        next.elements.push(*v);
                    }
                    next
                }),
            )
            .with_command(
                Command::new("pop", |_state: &QueueModel| ArgSpec::tuple([]), |_args| Ok(0))
                    .with_requires(|state: &QueueModel| !state.elements.is_empty())
                    .with_next_state(|state: &QueueModel, _args, _result| {
                        let mut next = state.clone();
                        if !next.elements.is_empty() {
                            next.elements.remove(0);
                        }
                        next
                    })
                    .with_postcondition(|prev, _next, _args, result| match prev.elements.first() {
                        Some(expected) => result == expected,
                        None => true,
                    }),
            )
    }

    fn push(counter: &mut HandleCounter, value: i64) -> Invocation<i64> {
        Invocation { handle: counter.next(), command: "push".to_string(), args: ArgTree::Literal(value) }
    }

    fn pop(counter: &mut HandleCounter) -> Invocation<i64> {
        Invocation { handle: counter.next(), command: "pop".to_string(), args: ArgTree::Tuple(Vec::new()) }
    }

    #[test]
    fn s1_sequential_push_pop_passes() {
        let spec = queue_spec();
        let mut counter = HandleCounter::new();
        let h_push4 = push(&mut counter, 4);
        let h_push2 = push(&mut counter, 2);
        let h_pop = pop(&mut counter);
        let handles = (h_push4.handle, h_push2.handle, h_pop.handle);
        let program = Program::sequential_only(vec![h_push4, h_push2, h_pop]);

        let mut execution = Bindings::new();
        execution.bind(handles.0, Outcome::Value(0, "0".to_string()));
        execution.bind(handles.1, Outcome::Value(0, "0".to_string()));
        execution.bind(handles.2, Outcome::Value(4, "4".to_string()));

        assert!(linearize(&spec, &program, &execution, None).is_ok());
    }

    #[test]
    fn s4_empty_program_passes() {
        let spec = queue_spec();
        let program: Program<i64> = Program::default();
        let execution = Bindings::new();
        assert!(linearize(&spec, &program, &execution, None).is_ok());
    }

    #[test]
    fn a_caught_exception_in_the_prefix_fails_immediately() {
        let spec = queue_spec();
        let mut counter = HandleCounter::new();
        let h_push = push(&mut counter, 1);
        let handle = h_push.handle;
        let program = Program::sequential_only(vec![h_push]);

        let mut execution = Bindings::new();
        execution.bind(handle, Outcome::CaughtException("boom".to_string()));

        assert!(linearize(&spec, &program, &execution, None).is_err());
    }

    #[test]
    fn p1_one_accepting_interleaving_is_enough() {
        let spec = queue_spec();
        let mut counter = HandleCounter::new();
        let h_push = push(&mut counter, 1);
        let push_handle = h_push.handle;
        let h_pop = pop(&mut counter);
        let pop_handle = h_pop.handle;

        let program = Program::new(Vec::new(), vec![vec![h_push], vec![h_pop]]);

        let mut execution = Bindings::new();
        execution.bind(push_handle, Outcome::Value(0, "0".to_string()));
        execution.bind(pop_handle, Outcome::Value(1, "1".to_string()));

        assert!(linearize(&spec, &program, &execution, None).is_ok());
    }
}

//! Program generator (C4).
//!
//! Builds a [`Program`] by interleaving argument generation with model simulation under
//! preconditions (spec.md §4.4). The sequential phase is generated first; if `threads > 0`,
//! each parallel thread is then generated independently from the *same* post-sequential
//! model state, without propagating state changes between threads (spec.md §4.4 step 3).

use std::fmt;

use proptest::strategy::Strategy;
use proptest::test_runner::TestRunner;
use rand::Rng;

use crate::argspec::build_strategy;
use crate::command::{ResultRef, Spec};
use crate::generated::{GeneratedInvocation, GeneratedProgram};
use crate::handle::HandleCounter;

/// How many times the generator retries a command whose `model_precondition` rejected the
/// generated arguments before giving up on this step and ending the (sub-)phase early
/// (spec.md §4.4 step 2c: "discard and retry a bounded number of times").
pub const MAX_PRECONDITION_RETRIES: usize = 50;

/// Probability of ending the sequential phase early given `remaining` steps still available
/// out of a `budget`-step phase.
///
/// spec.md only requires that the coin is "weighted by remaining size" so that smaller test
/// sizes tend to produce shorter programs; this implementation uses `1 / (remaining + 1)`,
/// which is highest right when the phase starts filling up its last slot and falls off as
/// more budget remains.
fn stop_probability(remaining: usize) -> f64 {
    1.0 / (remaining as f64 + 1.0)
}

/// Generate a full [`Program`] — sequential prefix plus `threads` independent parallel
/// threads — against `spec`, using `runner` for all randomness.
pub fn generate_program<S, V>(
    spec: &Spec<S, V>,
    runner: &mut TestRunner,
    setup_value: Option<&V>,
    max_length: usize,
    threads: usize,
) -> GeneratedProgram<V>
where
    S: Clone + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    let mut counter = HandleCounter::new();
    let initial_state = spec.initial_state(setup_value);
    let (sequential, post_sequential_state) =
        generate_phase(spec, runner, initial_state, &mut counter, max_length);

    let mut parallel = Vec::with_capacity(threads);
    for _ in 0..threads {
        let (thread_invocations, _) = generate_phase(
            spec,
            runner,
            post_sequential_state.clone(),
            &mut counter,
            max_length,
        );
        parallel.push(thread_invocations);
    }

    GeneratedProgram { sequential, parallel }
}

/// Generate one phase (the sequential prefix, or a single parallel thread) starting from
/// `state`, returning the invocations produced and the model state after the last one.
fn generate_phase<S, V>(
    spec: &Spec<S, V>,
    runner: &mut TestRunner,
    mut state: S,
    counter: &mut HandleCounter,
    max_length: usize,
) -> (Vec<GeneratedInvocation<V>>, S)
where
    S: Clone + 'static,
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    let mut invocations = Vec::new();

    while invocations.len() < max_length {
        let remaining = max_length - invocations.len();
        if runner.rng().gen_bool(stop_probability(remaining).clamp(0.0, 1.0)) {
            break;
        }

        let name = match pick_command(spec, runner, &state) {
            Some(n) => n,
            None => break,
        };
        let command = match spec.command(&name) {
            Ok(c) => c,
            Err(_) => break,
        };

        let accepted = (0..MAX_PRECONDITION_RETRIES).find_map(|attempt| {
            let arg_spec = (command.model_args)(&state);
            let strategy = build_strategy(&arg_spec);
            let tree = strategy.new_tree(runner).ok()?;
            if (command.model_precondition)(&state, &tree.current()) {
                Some(tree)
            } else {
                tracing::trace!(command = %name, attempt, "model_precondition rejected generated arguments; retrying");
                None
            }
        });

        let tree = match accepted {
            Some(tree) => tree,
            None => break,
        };

        let handle = counter.next();
        state = (command.model_next_state)(&state, &tree.current(), ResultRef::Sym(handle));
        tracing::debug!(%handle, command = %name, "generated invocation");
        invocations.push(GeneratedInvocation { handle, command: name, tree });
    }

    (invocations, state)
}

/// Pick the next command name: defer to `generate_command` if present and it picks one,
/// otherwise fall back to a uniform choice over commands whose `model_requires` holds
/// (spec.md §4.4 step 2a).
fn pick_command<S, V>(spec: &Spec<S, V>, runner: &mut TestRunner, state: &S) -> Option<String>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    if let Some(generate) = spec.generate_command.as_ref() {
        if let Some(name) = generate(state) {
            return Some(name);
        }
    }

    let eligible = spec.eligible_commands(state);
    if eligible.is_empty() {
        return None;
    }
    let idx = runner.rng().gen_range(0..eligible.len());
    Some(eligible[idx].to_string())
}

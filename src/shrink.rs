//! Shrinker (C5).
//!
//! Shrinks a [`GeneratedProgram`] while preserving well-formedness and preconditions
//! (spec.md §4.5). Two kinds of candidate are tried, smallest change first:
//!
//! 1. **Structural moves** — drop one invocation, or move a parallel thread's first
//!    invocation into the sequential suffix. Candidates are re-validated (well-formed,
//!    preconditions hold along the model trajectory) before being considered; invalid ones
//!    are discarded silently (spec.md §7: "rejected silently; never presented to the
//!    runner").
//! 2. **Per-argument shrink** — once no structural move both validates and still fails,
//!    each invocation's own value tree is asked to `simplify()`; if the simplified tree no
//!    longer validates or the program stops failing, the tree is asked to `complicate()` to
//!    back off to its last accepted value (the usual `proptest` `ValueTree` discipline).
//!
//! The whole loop is deterministic: no randomness is consulted after generation, only the
//! (already-seeded) value trees' own shrink progression and candidate ordering over indices.
//! Value trees are never cloned (`proptest`'s `ValueTree` is not `Clone`); every candidate is
//! checked against a throwaway [`Program`] snapshot first, and only an *accepted* structural
//! move is actually applied to the owned [`GeneratedProgram`] by moving elements out of it.

use crate::command::{ResultRef, Spec};
use crate::generated::GeneratedProgram;
use crate::program::{Invocation, Program};

/// Does `candidate`'s trajectory hold together: every referenced handle comes from strictly
/// earlier in its own thread (or the sequential prefix), and `model_precondition` holds at
/// every step of the model simulation (spec.md §4.5's pre-run rejection rule).
pub fn is_well_formed_and_precondition_holds<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    candidate: &Program<V>,
) -> bool
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let initial_state = spec.initial_state(setup_value);
    let Some(post_sequential) = simulate_trajectory(spec, initial_state, &candidate.sequential)
    else {
        return false;
    };
    for thread in &candidate.parallel {
        if simulate_trajectory(spec, post_sequential.clone(), thread).is_none() {
            return false;
        }
    }
    true
}

/// Walk `invocations` re-evaluating `model_precondition` against a model state that starts
/// at `state`, rejecting handle references to anything not strictly earlier in this same
/// list. Returns the model state after the last invocation on success.
fn simulate_trajectory<S, V>(
    spec: &Spec<S, V>,
    mut state: S,
    invocations: &[Invocation<V>],
) -> Option<S>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let mut seen = std::collections::HashSet::new();
    seen.insert(crate::handle::Handle::SETUP);
    for inv in invocations {
        let mut referenced = Vec::new();
        crate::handle::referenced_handles(&inv.args, &mut referenced);
        if referenced.iter().any(|h| !seen.contains(h)) {
            return None;
        }
        let command = spec.command(&inv.command).ok()?;
        if !(command.model_precondition)(&state, &inv.args) {
            return None;
        }
        state = (command.model_next_state)(&state, &inv.args, ResultRef::Sym(inv.handle));
        seen.insert(inv.handle);
    }
    Some(state)
}

/// Shrink `generated` against `is_failing` (typically "run it for real and check the
/// linearizer rejects it"), returning the smallest program found that is both valid and
/// still failing.
pub fn shrink_program<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    mut generated: GeneratedProgram<V>,
    mut is_failing: impl FnMut(&Program<V>) -> bool,
) -> Program<V>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    loop {
        match try_structural_move(spec, setup_value, generated, &mut is_failing) {
            Ok(shrunk) => {
                generated = shrunk;
                continue;
            }
            Err(unchanged) => generated = unchanged,
        }
        if try_argument_shrink(spec, setup_value, &mut generated, &mut is_failing) {
            continue;
        }
        break;
    }
    generated.current_program()
}

/// Try every single-invocation removal (sequential, then each thread) and every
/// thread-to-sequential move, smallest-removal-set first. Each candidate is checked against
/// a cheap [`Program`] snapshot; the first one that validates and still fails is applied to
/// `generated` for real (moving, not cloning, its value trees) and returned as `Ok`.
/// Returns `Err(generated)` unchanged if nothing was accepted.
fn try_structural_move<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    mut generated: GeneratedProgram<V>,
    is_failing: &mut impl FnMut(&Program<V>) -> bool,
) -> Result<GeneratedProgram<V>, GeneratedProgram<V>>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let current = generated.current_program();

    for i in (0..current.sequential.len()).rev() {
        let mut candidate = current.clone();
        candidate.sequential.remove(i);
        if accept(spec, setup_value, &candidate, is_failing) {
            generated.sequential.remove(i);
            return Ok(generated);
        }
    }

    for t in 0..current.parallel.len() {
        for i in (0..current.parallel[t].len()).rev() {
            let mut candidate = current.clone();
            candidate.parallel[t].remove(i);
            if accept(spec, setup_value, &candidate, is_failing) {
                generated.parallel[t].remove(i);
                return Ok(generated);
            }
        }
    }

    for t in 0..current.parallel.len() {
        if current.parallel[t].is_empty() {
            continue;
        }
        let mut candidate = current.clone();
        let moved = candidate.parallel[t].remove(0);
        candidate.sequential.push(moved);
        if accept(spec, setup_value, &candidate, is_failing) {
            let moved = generated.parallel[t].remove(0);
            generated.sequential.push(moved);
            return Ok(generated);
        }
    }

    Err(generated)
}

fn accept<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    candidate: &Program<V>,
    is_failing: &mut impl FnMut(&Program<V>) -> bool,
) -> bool
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    is_well_formed_and_precondition_holds(spec, setup_value, candidate) && is_failing(candidate)
}

/// Try to `simplify()` each invocation's value tree in turn, accepting the first
/// simplification that keeps the program valid and failing; backs off with `complicate()`
/// otherwise. Returns whether any simplification was accepted.
fn try_argument_shrink<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    generated: &mut GeneratedProgram<V>,
    is_failing: &mut impl FnMut(&Program<V>) -> bool,
) -> bool
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let total = generated.len();
    for idx in 0..total {
        if try_simplify_at(spec, setup_value, generated, idx, is_failing) {
            return true;
        }
    }
    false
}

fn try_simplify_at<S, V>(
    spec: &Spec<S, V>,
    setup_value: Option<&V>,
    generated: &mut GeneratedProgram<V>,
    flat_index: usize,
    is_failing: &mut impl FnMut(&Program<V>) -> bool,
) -> bool
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    let tree = locate_tree_mut(generated, flat_index);
    let Some(tree) = tree else { return false };
    if !tree.simplify() {
        return false;
    }

    let candidate = generated.current_program();
    if is_well_formed_and_precondition_holds(spec, setup_value, &candidate) && is_failing(&candidate) {
        true
    } else {
        let tree = locate_tree_mut(generated, flat_index).expect("index stable across one call");
        tree.complicate();
        false
    }
}

fn locate_tree_mut<V>(
    generated: &mut GeneratedProgram<V>,
    flat_index: usize,
) -> Option<&mut Box<dyn proptest::strategy::ValueTree<Value = crate::argspec::ArgTree<V>>>> {
    let seq_len = generated.sequential.len();
    if flat_index < seq_len {
        return Some(&mut generated.sequential[flat_index].tree);
    }
    let mut remaining = flat_index - seq_len;
    for thread in &mut generated.parallel {
        if remaining < thread.len() {
            return Some(&mut thread[remaining].tree);
        }
        remaining -= thread.len();
    }
    None
}

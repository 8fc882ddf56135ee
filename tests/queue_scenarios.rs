//! Integration tests for the concrete scenarios in spec.md §8's table (S1–S4, P1/P2): a
//! mutable queue with `new`, `push`, `pop`. The purely-sequential scenarios (S1/S2/S4) run
//! through the top-level `run_spec` entry point; the parallel ones (P1/P2) hand-build the
//! exact program spec.md's table describes and drive it through `runner`/`linearize`
//! directly, since a generated parallel program could legitimately race two threads into
//! popping the same not-yet-pushed element — a real contention failure, not a linearizer
//! bug — and this suite should never be flaky.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use linearcheck::handle::HandleCounter;
use linearcheck::{ArgSpec, ArgTree, Command, Handle, Invocation, Options, Program, ResultRef, Spec};

#[derive(Debug, Clone)]
enum V {
    QueueId(u64),
    Item(i64),
    Nil,
}

#[derive(Debug, Clone, Default)]
struct Model {
    queue_handle: Option<Handle>,
    elements: VecDeque<i64>,
}

type Storage = Arc<Mutex<HashMap<u64, VecDeque<i64>>>>;

fn queue_id(node: &ArgTree<V>) -> Result<u64, String> {
    match node {
        ArgTree::Literal(V::QueueId(id)) => Ok(*id),
        other => Err(format!("expected a queue id, got {other:?}")),
    }
}

/// `buggy = true` reproduces spec.md's S2: `pop` returns the queue itself rather than the
/// element it removed.
fn queue_spec(buggy: bool) -> Spec<Model, V> {
    let storage: Storage = Arc::new(Mutex::new(HashMap::new()));
    let next_id = Arc::new(AtomicU64::new(1));

    Spec::new(|_: Option<&V>| Model::default())
        .with_setup({
            let storage = storage.clone();
            let next_id = next_id.clone();
            move || {
                storage.lock().unwrap().clear();
                next_id.store(1, Ordering::SeqCst);
                Ok(V::Nil)
            }
        })
        .with_command(
            Command::new(
                "new",
                |_state: &Model| ArgSpec::tuple([]),
                {
                    let storage = storage.clone();
                    let next_id = next_id.clone();
                    move |_args: &ArgTree<V>| {
                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                        storage.lock().unwrap().insert(id, VecDeque::new());
                        Ok(V::QueueId(id))
                    }
                },
            )
            .with_requires(|state: &Model| state.queue_handle.is_none())
            .with_next_state(|state: &Model, _args, result| {
                let mut next = state.clone();
                if let ResultRef::Sym(h) = result {
                    next.queue_handle = Some(h);
                }
                next
            }),
        )
        .with_command(
            Command::new(
                "push",
                |state: &Model| {
                    let h = state.queue_handle.expect("push requires an existing queue");
                    ArgSpec::tuple([ArgSpec::Handle(h), ArgSpec::Gen(any::<i64>().prop_map(V::Item).boxed())])
                },
                {
                    let storage = storage.clone();
                    move |args: &ArgTree<V>| match args {
                        ArgTree::Tuple(items) if items.len() == 2 => {
                            let id = queue_id(&items[0])?;
                            let ArgTree::Literal(V::Item(value)) = &items[1] else {
                                return Err("push: expected an item literal".to_string());
                            };
                            let mut guard = storage.lock().unwrap();
                            guard.get_mut(&id).ok_or_else(|| "push: unknown queue".to_string())?.push_back(*value);
                            Ok(V::Nil)
                        }
                        other => Err(format!("push: malformed args {other:?}")),
                    }
                },
            )
            .with_requires(|state: &Model| state.queue_handle.is_some())
            .with_next_state(|state: &Model, args, _result| {
                let mut next = state.clone();
                if let ArgTree::Tuple(items) = args {
                    if let Some(ArgTree::Literal(V::Item(v))) = items.get(1) {
                        next.elements.push_back(*v);
                    }
                }
                next
            }),
        )
        .with_command(
            Command::new(
                "pop",
                |state: &Model| {
                    let h = state.queue_handle.expect("pop requires an existing queue");
                    ArgSpec::tuple([ArgSpec::Handle(h)])
                },
                {
                    let storage = storage.clone();
                    move |args: &ArgTree<V>| {
                        let ArgTree::Tuple(items) = args else {
                            return Err("pop: malformed args".to_string());
                        };
                        let id = queue_id(&items[0])?;
                        let mut guard = storage.lock().unwrap();
                        let q = guard.get_mut(&id).ok_or_else(|| "pop: unknown queue".to_string())?;
                        if buggy {
                            q.pop_front();
                            Ok(V::QueueId(id))
                        } else {
                            q.pop_front().map(V::Item).ok_or_else(|| "pop: queue was empty".to_string())
                        }
                    }
                },
            )
            .with_requires(|state: &Model| !state.elements.is_empty())
            .with_next_state(|state: &Model, _args, _result| {
                let mut next = state.clone();
                next.elements.pop_front();
                next
            })
            .with_postcondition(|prev: &Model, _next, _args, result| match prev.elements.front() {
                Some(expected) => matches!(result, V::Item(v) if v == expected),
                None => true,
            }),
        )
        // Forces new -> push -> pop -> push -> pop -> ... so the scenario assertions below
        // (shrink bound, reproducibility) don't depend on how often the uniform fallback in
        // spec.md §4.4 step 2a happens to pick "pop".
        .with_generate_command(|state: &Model| {
            Some(
                if state.queue_handle.is_none() {
                    "new"
                } else if state.elements.is_empty() {
                    "push"
                } else {
                    "pop"
                }
                .to_string(),
            )
        })
}

/// S1/S4 — a correctly-implemented queue linearizes every generated program, sequential or
/// empty, across a spread of seeds.
#[test]
fn correct_queue_always_linearizes() {
    let spec = Arc::new(queue_spec(false));
    for seed in 0..20u64 {
        let options = Options::default().with_num_tests(20).with_max_length(12).with_seed(seed);
        assert!(linearcheck::run_spec(spec.clone(), &options).is_ok(), "seed {seed} should pass");
    }
}

/// S2 — a `pop` that returns the queue handle instead of the popped element is rejected,
/// and the engine shrinks the counter-example to at most the three-step witness spec.md's
/// table calls out (`new`, one `push`, one `pop`).
#[test]
fn buggy_pop_is_caught_and_shrinks_to_three_steps_or_fewer() {
    let spec = Arc::new(queue_spec(true));
    let options = Options::default().with_num_tests(50).with_max_length(15).with_seed(1234);

    let err = linearcheck::run_spec(spec, &options).expect_err("a buggy pop must fail linearization");
    let report = err.to_string();
    let step_lines = report.lines().filter(|line| line.trim_start().starts_with('#')).count();
    assert!(step_lines <= 3, "expected a shrunk witness of at most 3 steps, got:\n{report}");
}

/// Re-running the same seed against the same buggy spec reproduces the identical shrunk
/// failure (spec.md §8: "must itself be reproducible under the same seed").
#[test]
fn shrinking_is_reproducible_under_the_same_seed() {
    let run = || {
        let spec = Arc::new(queue_spec(true));
        let options = Options::default().with_num_tests(50).with_max_length(15).with_seed(99);
        linearcheck::run_spec(spec, &options).unwrap_err().to_string()
    };
    assert_eq!(run(), run());
}

/// Builds spec.md's P1/P2 program by hand (seq: `new`, `push(1)`; thread A: `push(2)`;
/// thread B: `pop`), runs it for real, and returns the spec alongside the real execution
/// trace. The sequential `push(1)` guarantees the queue is never empty when thread B's pop
/// races thread A's push, so the real outcome is never a contention exception — only whether
/// the *value* thread B observed matches some valid interleaving is in question.
fn run_p1_program(buggy: bool) -> (Spec<Model, V>, Program<V>, linearcheck::Bindings<V>, Option<V>) {
    let spec = queue_spec(buggy);
    let setup_value = match spec.run_setup() {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => panic!("setup failed: {e}"),
        None => None,
    };

    let mut counter = HandleCounter::new();
    let new_inv = Invocation { handle: counter.next(), command: "new".to_string(), args: ArgTree::Tuple(Vec::new()) };
    let new_handle = new_inv.handle;
    let push_one = Invocation {
        handle: counter.next(),
        command: "push".to_string(),
        args: ArgTree::Tuple(vec![ArgTree::Handle(new_handle), ArgTree::Literal(V::Item(1))]),
    };
    let thread_a_push_two = Invocation {
        handle: counter.next(),
        command: "push".to_string(),
        args: ArgTree::Tuple(vec![ArgTree::Handle(new_handle), ArgTree::Literal(V::Item(2))]),
    };
    let thread_b_pop = Invocation {
        handle: counter.next(),
        command: "pop".to_string(),
        args: ArgTree::Tuple(vec![ArgTree::Handle(new_handle)]),
    };

    let program = Program::new(vec![new_inv, push_one], vec![vec![thread_a_push_two], vec![thread_b_pop]]);
    let execution = linearcheck::runner::execute_program(&spec, &program, setup_value.as_ref());
    (spec, program, execution, setup_value)
}

/// P1 — a push racing a pop on the same queue has at least one valid interleaving (the pop
/// sees the element the sequential prefix already pushed), so the correct queue passes.
#[test]
fn p1_concurrent_push_and_pop_linearizes() {
    let (spec, program, execution, setup_value) = run_p1_program(false);
    assert!(linearcheck::linearize::linearize(&spec, &program, &execution, setup_value.as_ref()).is_ok());
}

/// P2 — with the buggy `pop` in play, thread B's captured result can never match any
/// interleaving's expected element, so no interleaving linearizes.
#[test]
fn p2_buggy_pop_has_no_valid_interleaving() {
    let (spec, program, execution, setup_value) = run_p1_program(true);
    assert!(linearcheck::linearize::linearize(&spec, &program, &execution, setup_value.as_ref()).is_err());
}

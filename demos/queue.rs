//! Demonstration binary for `linearcheck`: the mutable-queue example from spec.md §8's
//! testable-properties table (`new`, `push`, `pop`), run against a real in-process queue.
//!
//! `--bug` swaps in a deliberately broken `pop` that returns the queue's own identifier
//! instead of the popped element (spec.md's S2 scenario) so a caller can see the engine
//! find and shrink the failure. `--threads N` additionally generates `N` parallel threads
//! against the same queue (spec.md's P1/P2 scenarios).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use clap::Parser;
use proptest::prelude::*;

use linearcheck::{ArgSpec, ArgTree, Command, Handle, Options, ResultRef, Spec};

#[derive(Parser)]
#[command(author, version, about = "Run the linearcheck mutable-queue demo", long_about = None)]
struct Args {
    /// Use a `pop` that returns the queue handle instead of the popped element.
    #[arg(long)]
    bug: bool,
    /// Number of parallel threads to generate in addition to the sequential prefix.
    #[arg(long, default_value_t = 0)]
    threads: usize,
    /// Number of programs to try.
    #[arg(long, default_value_t = 200)]
    cases: u32,
    /// Max length of the sequential prefix (and of each thread).
    #[arg(long, default_value_t = 15)]
    max_length: usize,
    /// Harness seed; omit to derive one from the wall clock.
    #[arg(long)]
    seed: Option<u64>,
}

/// The single value type shared by every command's arguments and results: a queue's own
/// handle-free identifier, the unit result of a successful `push`, or a popped element.
#[derive(Debug, Clone)]
enum QueueValue {
    QueueId(u64),
    Item(i64),
    Nil,
}

#[derive(Debug, Clone, Default)]
struct QueueModel {
    queue_handle: Option<Handle>,
    elements: VecDeque<i64>,
}

type Storage = Arc<Mutex<HashMap<u64, VecDeque<i64>>>>;

fn queue_id(node: &ArgTree<QueueValue>) -> Result<u64, String> {
    match node {
        ArgTree::Literal(QueueValue::QueueId(id)) => Ok(*id),
        other => Err(format!("expected a queue id, got {other:?}")),
    }
}

fn push_args(args: &ArgTree<QueueValue>) -> Result<(u64, i64), String> {
    match args {
        ArgTree::Tuple(items) if items.len() == 2 => {
            let id = queue_id(&items[0])?;
            match &items[1] {
                ArgTree::Literal(QueueValue::Item(v)) => Ok((id, *v)),
                other => Err(format!("push: expected an item literal, got {other:?}")),
            }
        }
        other => Err(format!("push: malformed args {other:?}")),
    }
}

fn pop_arg(args: &ArgTree<QueueValue>) -> Result<u64, String> {
    match args {
        ArgTree::Tuple(items) if items.len() == 1 => queue_id(&items[0]),
        other => Err(format!("pop: malformed args {other:?}")),
    }
}

/// Build the spec against a fresh, `setup`-owned [`Storage`]; `buggy` wires in the S2-style
/// broken `pop` when set.
fn queue_spec(storage: Storage, next_id: Arc<AtomicU64>, buggy: bool) -> Spec<QueueModel, QueueValue> {
    Spec::new(|_: Option<&QueueValue>| QueueModel::default())
        .with_setup({
            let storage = storage.clone();
            let next_id = next_id.clone();
            move || {
                storage.lock().unwrap().clear();
                next_id.store(1, Ordering::SeqCst);
                Ok(QueueValue::Nil)
            }
        })
        .with_command(
            Command::new(
                "new",
                |_state: &QueueModel| ArgSpec::tuple([]),
                {
                    let storage = storage.clone();
                    let next_id = next_id.clone();
                    move |_args: &ArgTree<QueueValue>| {
                        let id = next_id.fetch_add(1, Ordering::SeqCst);
                        storage.lock().unwrap().insert(id, VecDeque::new());
                        Ok(QueueValue::QueueId(id))
                    }
                },
            )
            .with_requires(|state: &QueueModel| state.queue_handle.is_none())
            .with_next_state(|state: &QueueModel, _args, result| {
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
                |state: &QueueModel| {
                    let h = state.queue_handle.expect("push requires an existing queue");
                    ArgSpec::tuple([ArgSpec::Handle(h), ArgSpec::Gen(any::<i64>().prop_map(QueueValue::Item).boxed())])
                },
                {
                    let storage = storage.clone();
                    move |args: &ArgTree<QueueValue>| {
                        let (id, value) = push_args(args)?;
                        let mut guard = storage.lock().unwrap();
                        let q = guard.get_mut(&id).ok_or_else(|| "push: unknown queue".to_string())?;
                        q.push_back(value);
                        Ok(QueueValue::Nil)
                    }
                },
            )
            .with_requires(|state: &QueueModel| state.queue_handle.is_some())
            .with_next_state(|state: &QueueModel, args, _result| {
                let mut next = state.clone();
                if let ArgTree::Tuple(items) = args {
                    if let Some(ArgTree::Literal(QueueValue::Item(v))) = items.get(1) {
                        next.elements.push_back(*v);
                    }
                }
                next
            }),
        )
        .with_command(
            Command::new(
                "pop",
                |state: &QueueModel| {
                    let h = state.queue_handle.expect("pop requires an existing queue");
                    ArgSpec::tuple([ArgSpec::Handle(h)])
                },
                {
                    let storage = storage.clone();
                    move |args: &ArgTree<QueueValue>| {
                        let id = pop_arg(args)?;
                        let mut guard = storage.lock().unwrap();
                        let q = guard.get_mut(&id).ok_or_else(|| "pop: unknown queue".to_string())?;
                        if buggy {
                            q.pop_front();
                            Ok(QueueValue::QueueId(id))
                        } else {
                            q.pop_front().map(QueueValue::Item).ok_or_else(|| "pop: queue was empty".to_string())
                        }
                    }
                },
            )
            .with_requires(|state: &QueueModel| !state.elements.is_empty())
            .with_next_state(|state: &QueueModel, _args, _result| {
                let mut next = state.clone();
                next.elements.pop_front();
                next
            })
            .with_postcondition(|prev: &QueueModel, _next, _args, result| match prev.elements.front() {
                Some(expected) => matches!(result, QueueValue::Item(v) if v == expected),
                None => true,
            }),
        )
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let storage: Storage = Arc::new(Mutex::new(HashMap::new()));
    let next_id = Arc::new(AtomicU64::new(1));
    let spec = Arc::new(queue_spec(storage, next_id, args.bug));

    let mut options = Options::default()
        .with_num_tests(args.cases)
        .with_max_length(args.max_length)
        .with_threads(args.threads);
    if let Some(seed) = args.seed {
        options = options.with_seed(seed);
    }

    match linearcheck::run_spec(spec, &options) {
        Ok(()) => {
            println!("ok: {} programs linearized successfully", args.cases);
            Ok(())
        }
        Err(err) => {
            eprintln!("FAILED (shrunk counter-example below):\n{err}");
            std::process::exit(1);
        }
    }
}

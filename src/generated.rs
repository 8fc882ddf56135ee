//! A generated program that still carries each invocation's live `proptest` value tree, so
//! the shrinker (C5) can ask individual arguments to shrink in place rather than only ever
//! being able to delete whole invocations.

use proptest::strategy::ValueTree;

use crate::argspec::ArgTree;
use crate::handle::Handle;
use crate::program::{Invocation, Program};

/// One generated invocation together with the value tree that produced its current
/// argument tree. `simplify`/`complicate` forward directly to the underlying tree
/// (spec.md §4.5: "handle leaves do not shrink; they are identifiers" — true by
/// construction, since [`ArgTree::Handle`] leaves came from `Just` strategies).
pub struct GeneratedInvocation<V> {
    pub handle: Handle,
    pub command: String,
    pub tree: Box<dyn ValueTree<Value = ArgTree<V>>>,
}

impl<V: Clone> GeneratedInvocation<V> {
    pub fn current(&self) -> Invocation<V> {
        Invocation { handle: self.handle, command: self.command.clone(), args: self.tree.current() }
    }
}

/// A [`Program`] whose invocations retain their generating value trees.
#[derive(Default)]
pub struct GeneratedProgram<V> {
    pub sequential: Vec<GeneratedInvocation<V>>,
    pub parallel: Vec<Vec<GeneratedInvocation<V>>>,
}

impl<V: Clone> GeneratedProgram<V> {
    pub fn current_program(&self) -> Program<V> {
        Program::new(
            self.sequential.iter().map(GeneratedInvocation::current).collect(),
            self.parallel
                .iter()
                .map(|thread| thread.iter().map(GeneratedInvocation::current).collect())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.sequential.len() + self.parallel.iter().map(|t| t.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

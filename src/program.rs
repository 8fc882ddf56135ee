//! Shared data types for a generated program: [`Invocation`] and [`Program`] (spec.md §3).

use std::fmt;

use crate::argspec::ArgTree;
use crate::handle::Handle;

/// A single command call within a program: the handle it will bind, the command it invokes,
/// and its (by-now concrete) argument tree.
#[derive(Debug, Clone)]
pub struct Invocation<V> {
    pub handle: Handle,
    pub command: String,
    pub args: ArgTree<V>,
}

impl<V: fmt::Debug> fmt::Display for Invocation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}({:?})", self.handle, self.command, self.args)
    }
}

/// A sequential prefix plus zero or more parallel threads of invocations (spec.md §3).
///
/// All handles across every thread are globally unique and numbered in the order they were
/// generated; a thread may reference handles from the sequential prefix but never from a
/// sibling thread (spec.md §3's invariants, §4.4).
#[derive(Debug, Clone, Default)]
pub struct Program<V> {
    pub sequential: Vec<Invocation<V>>,
    pub parallel: Vec<Vec<Invocation<V>>>,
}

impl<V> Program<V> {
    pub fn new(sequential: Vec<Invocation<V>>, parallel: Vec<Vec<Invocation<V>>>) -> Self {
        Self { sequential, parallel }
    }

    pub fn sequential_only(sequential: Vec<Invocation<V>>) -> Self {
        Self { sequential, parallel: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.sequential.is_empty() && self.parallel.iter().all(|t| t.is_empty())
    }

    pub fn len(&self) -> usize {
        self.sequential.len() + self.parallel.iter().map(|t| t.len()).sum::<usize>()
    }

    /// Every invocation in the program, in generation order (sequential prefix first, then
    /// each thread in turn). Used by well-formedness checks that only care about "did every
    /// handle reference come from something earlier".
    pub fn all_invocations(&self) -> impl Iterator<Item = &Invocation<V>> {
        self.sequential.iter().chain(self.parallel.iter().flatten())
    }
}

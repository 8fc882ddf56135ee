//! Argument builder (C3).
//!
//! `model_args` hands back an [`ArgSpec`]: a tree mixing literal values, handles to earlier
//! results, and opaque sub-generators. This module collapses such a spec into a concrete
//! [`ArgTree`] — a tree with no sub-generators left — by turning it into a `proptest`
//! [`Strategy`], so the randomness, sizing, and shrinking all come from the harness we
//! already depend on for everything else (spec.md §6).

use std::fmt;

use proptest::prelude::*;
use proptest::strategy::{BoxedStrategy, NewTree, ValueTree};
use proptest::test_runner::TestRunner;

use crate::handle::Handle;

/// A value tree with no sub-generators: literals, handles, ordered tuples, and maps keyed by
/// literal strings (spec.md §3's "Argument tree").
#[derive(Debug, Clone, PartialEq)]
pub enum ArgTree<V> {
    Literal(V),
    Handle(Handle),
    Tuple(Vec<ArgTree<V>>),
    Map(Vec<(String, ArgTree<V>)>),
}

impl<V> ArgTree<V> {
    pub fn literal(v: V) -> Self {
        ArgTree::Literal(v)
    }
}

/// The argument *specification* returned by `model_args`: like [`ArgTree`], but leaves may
/// also be opaque sub-generators (spec.md §3/§9).
pub enum ArgSpec<V> {
    Literal(V),
    Handle(Handle),
    Tuple(Vec<ArgSpec<V>>),
    Map(Vec<(String, ArgSpec<V>)>),
    Gen(BoxedStrategy<V>),
}

impl<V: fmt::Debug> fmt::Debug for ArgSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSpec::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            ArgSpec::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
            ArgSpec::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            ArgSpec::Map(pairs) => f.debug_tuple("Map").field(pairs).finish(),
            ArgSpec::Gen(_) => f.write_str("Gen(<strategy>)"),
        }
    }
}

impl<V> ArgSpec<V> {
    pub fn tuple(items: impl IntoIterator<Item = ArgSpec<V>>) -> Self {
        ArgSpec::Tuple(items.into_iter().collect())
    }

    pub fn map(pairs: impl IntoIterator<Item = (&'static str, ArgSpec<V>)>) -> Self {
        ArgSpec::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// A strategy over a heterogeneous, fixed-length list of child strategies.
///
/// `proptest`'s tuple combinators only go up to a fixed static arity; `ArgSpec::Tuple`/`Map`
/// are runtime-length, so this hand-rolls the same idea: generate each child's value tree up
/// front, then shrink one child dimension at a time (spec.md §4.5's "per-argument shrink").
struct Fields<T> {
    children: Vec<BoxedStrategy<T>>,
}

struct FieldsTree<T> {
    trees: Vec<Box<dyn ValueTree<Value = T>>>,
    shrink_index: usize,
}

impl<T: fmt::Debug> fmt::Debug for Fields<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fields").field("arity", &self.children.len()).finish()
    }
}

impl<T: fmt::Debug> Strategy for Fields<T> {
    type Tree = FieldsTree<T>;
    type Value = Vec<T>;

    fn new_tree(&self, runner: &mut TestRunner) -> NewTree<Self> {
        let trees = self
            .children
            .iter()
            .map(|s| s.new_tree(runner))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldsTree { trees, shrink_index: 0 })
    }
}

impl<T: fmt::Debug> ValueTree for FieldsTree<T> {
    type Value = Vec<T>;

    fn current(&self) -> Vec<T> {
        self.trees.iter().map(|t| t.current()).collect()
    }

    fn simplify(&mut self) -> bool {
        while self.shrink_index < self.trees.len() {
            if self.trees[self.shrink_index].simplify() {
                return true;
            }
            self.shrink_index += 1;
        }
        false
    }

    fn complicate(&mut self) -> bool {
        if self.shrink_index < self.trees.len() {
            self.trees[self.shrink_index].complicate()
        } else {
            false
        }
    }
}

/// Collapse an [`ArgSpec`] into a `proptest` strategy producing a fully-realized
/// [`ArgTree`]: `Gen` nodes contribute their generated value, everything else is walked
/// structurally (spec.md §4.3).
pub fn build_strategy<V>(spec: &ArgSpec<V>) -> BoxedStrategy<ArgTree<V>>
where
    V: fmt::Debug + Clone + Send + Sync + 'static,
{
    match spec {
        ArgSpec::Literal(v) => Just(ArgTree::Literal(v.clone())).boxed(),
        ArgSpec::Handle(h) => Just(ArgTree::Handle(*h)).boxed(),
        ArgSpec::Gen(strategy) => strategy.clone().prop_map(ArgTree::Literal).boxed(),
        ArgSpec::Tuple(items) => {
            let children: Vec<_> = items.iter().map(build_strategy).collect();
            Fields { children }.prop_map(ArgTree::Tuple).boxed()
        }
        ArgSpec::Map(pairs) => {
            let keys: Vec<String> = pairs.iter().map(|(k, _)| k.clone()).collect();
            let children: Vec<_> = pairs.iter().map(|(_, v)| build_strategy(v)).collect();
            Fields { children }
                .prop_map(move |values| {
                    ArgTree::Map(keys.clone().into_iter().zip(values).collect())
                })
                .boxed()
        }
    }
}

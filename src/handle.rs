//! Symbolic-value registry (C1).
//!
//! A [`Handle`] names the eventual result of an [`Invocation`](crate::program::Invocation)
//! before it has actually run. Handles are minted in generation order starting at 1; handle
//! `0` is reserved for the result of `setup`.

use std::collections::HashMap;
use std::fmt;

use crate::argspec::ArgTree;
use crate::error::LinearCheckError;

/// An opaque reference to a command's (or `setup`'s) eventual result.
///
/// Equality is by the underlying sequence number, which also doubles as a display index:
/// `setup` is always `Handle(0)`, and subsequent invocations are numbered `1..n` in the
/// order they were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub(crate) u32);

impl Handle {
    /// The reserved handle naming the result of `setup`.
    pub const SETUP: Handle = Handle(0);

    /// The sequence number this handle was minted with.
    pub fn sequence(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}>", self.0)
    }
}

/// A monotonically increasing counter that mints fresh handles.
///
/// `setup`, if present, claims [`Handle::SETUP`] out of band; the counter itself starts
/// minting at 1.
#[derive(Debug, Clone)]
pub struct HandleCounter(u32);

impl Default for HandleCounter {
    fn default() -> Self {
        HandleCounter(1)
    }
}

impl HandleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next handle and advance the counter.
    pub fn next(&mut self) -> Handle {
        let h = Handle(self.0);
        self.0 += 1;
        h
    }

    /// The sequence number that will be assigned to the next minted handle.
    pub fn peek(&self) -> u32 {
        self.0
    }
}

/// The outcome of executing a single invocation against the real system.
#[derive(Debug, Clone)]
pub enum Outcome<V> {
    /// The command returned a value. The `String` is `to_string`-equivalent snapshot taken
    /// immediately after execution, used later to detect mutation (spec.md §6).
    Value(V, String),
    /// The command's `real_command` threw/panicked; the message is preserved for reporting.
    CaughtException(String),
}

impl<V> Outcome<V> {
    pub fn is_exception(&self) -> bool {
        matches!(self, Outcome::CaughtException(_))
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Outcome::Value(v, _) => Some(v),
            Outcome::CaughtException(_) => None,
        }
    }
}

/// Bindings accumulated while executing (or linearizing) a program: `Handle -> Outcome`.
///
/// Append-only during any one execution/linearization pass, per spec.md §5.
#[derive(Debug, Clone, Default)]
pub struct Bindings<V> {
    map: HashMap<Handle, Outcome<V>>,
}

impl<V> Bindings<V> {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    pub fn bind(&mut self, handle: Handle, outcome: Outcome<V>) {
        self.map.insert(handle, outcome);
    }

    pub fn get(&self, handle: Handle) -> Option<&Outcome<V>> {
        self.map.get(&handle)
    }

    /// Expose the backing map for reporting (spec.md §6); not part of the public API
    /// surface, since `Bindings` is otherwise accessed only through `bind`/`get`/`substitute`.
    pub(crate) fn as_map(&self) -> &HashMap<Handle, Outcome<V>> {
        &self.map
    }
}

impl<V: Clone> Bindings<V> {
    /// Deeply substitute every [`Handle`] leaf in `tree` with its bound value.
    ///
    /// Tuples and maps are walked recursively; any other node is returned unchanged. A
    /// handle with no binding is a well-formedness violation that should have been excluded
    /// earlier (generation / shrinking); it is reported as
    /// [`LinearCheckError::UnboundHandle`] rather than silently ignored.
    pub fn substitute(&self, tree: &ArgTree<V>) -> Result<ArgTree<V>, LinearCheckError> {
        match tree {
            ArgTree::Literal(v) => Ok(ArgTree::Literal(v.clone())),
            ArgTree::Handle(h) => match self.map.get(h) {
                Some(Outcome::Value(v, _)) => Ok(ArgTree::Literal(v.clone())),
                Some(Outcome::CaughtException(_)) => Err(LinearCheckError::UnboundHandle(*h)),
                None => Err(LinearCheckError::UnboundHandle(*h)),
            },
            ArgTree::Tuple(items) => {
                let substituted = items
                    .iter()
                    .map(|item| self.substitute(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ArgTree::Tuple(substituted))
            }
            ArgTree::Map(pairs) => {
                let substituted = pairs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.substitute(v)?)))
                    .collect::<Result<Vec<_>, LinearCheckError>>()?;
                Ok(ArgTree::Map(substituted))
            }
        }
    }
}

/// Walk `tree` and collect every [`Handle`] it references (in depth-first order, with
/// duplicates), used by the generator and shrinker to check well-formedness.
pub fn referenced_handles<V>(tree: &ArgTree<V>, out: &mut Vec<Handle>) {
    match tree {
        ArgTree::Literal(_) => {}
        ArgTree::Handle(h) => out.push(*h),
        ArgTree::Tuple(items) => {
            for item in items {
                referenced_handles(item, out);
            }
        }
        ArgTree::Map(pairs) => {
            for (_, v) in pairs {
                referenced_handles(v, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_reserves_setup_and_starts_at_one() {
        let mut c = HandleCounter::new();
        assert_eq!(Handle::SETUP.sequence(), 0);
        assert_eq!(c.next().sequence(), 1);
        assert_eq!(c.next().sequence(), 2);
    }

    #[test]
    fn substitution_is_deep_and_identity_on_literals() {
        let mut bindings: Bindings<i64> = Bindings::new();
        bindings.bind(Handle(1), Outcome::Value(42, "42".to_string()));

        let tree = ArgTree::Tuple(vec![
            ArgTree::Literal(7),
            ArgTree::Handle(Handle(1)),
            ArgTree::Map(vec![("k".to_string(), ArgTree::Handle(Handle(1)))]),
        ]);

        let out = bindings.substitute(&tree).unwrap();
        match out {
            ArgTree::Tuple(items) => {
                assert!(matches!(items[0], ArgTree::Literal(7)));
                assert!(matches!(items[1], ArgTree::Literal(42)));
                match &items[2] {
                    ArgTree::Map(pairs) => assert!(matches!(pairs[0].1, ArgTree::Literal(42))),
                    _ => panic!("expected map"),
                }
            }
            _ => panic!("expected tuple"),
        }
    }

    #[test]
    fn missing_binding_is_reported_not_panicked() {
        let bindings: Bindings<i64> = Bindings::new();
        let tree = ArgTree::Handle(Handle(99));
        assert!(matches!(
            bindings.substitute(&tree),
            Err(LinearCheckError::UnboundHandle(h)) if h == Handle(99)
        ));
    }

    #[test]
    fn referenced_handles_collects_in_depth_first_order() {
        let tree: ArgTree<i64> = ArgTree::Tuple(vec![
            ArgTree::Handle(Handle(3)),
            ArgTree::Map(vec![("a".into(), ArgTree::Handle(Handle(1)))]),
        ]);
        let mut out = Vec::new();
        referenced_handles(&tree, &mut out);
        assert_eq!(out, vec![Handle(3), Handle(1)]);
    }
}

//! Command table (C2).
//!
//! A [`Command`] bundles the callbacks spec.md §3 allows per operation into one value,
//! built with a `with_*` builder rather than a trait object per command — "a polymorphic
//! capability set" per spec.md §9, not a class hierarchy. [`Spec`] is the catalogue: the
//! command table plus the spec-level callbacks (`initial_state`, `setup`, `cleanup`,
//! `generate_command`, `spec_postcondition`) spec.md §4.2 describes living alongside it.

use std::collections::BTreeMap;
use std::fmt;

use crate::argspec::{ArgSpec, ArgTree};
use crate::error::LinearCheckError;

/// The result passed to `model_next_state`: symbolic during generation, concrete during
/// linearization (spec.md §9, "Symbolic / concrete duality").
#[derive(Debug, Clone, Copy)]
pub enum ResultRef<'a, V> {
    Sym(crate::handle::Handle),
    Concrete(&'a V),
}

type Requires<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;
type ArgsFn<S, V> = Box<dyn Fn(&S) -> ArgSpec<V> + Send + Sync>;
type Precondition<S, V> = Box<dyn Fn(&S, &ArgTree<V>) -> bool + Send + Sync>;
type NextState<S, V> = Box<dyn Fn(&S, &ArgTree<V>, ResultRef<'_, V>) -> S + Send + Sync>;
type RealCommand<V> = Box<dyn Fn(&ArgTree<V>) -> Result<V, String> + Send + Sync>;
type Postcondition<S, V> = Box<dyn Fn(&S, &S, &ArgTree<V>, &V) -> bool + Send + Sync>;

/// One named operation: its model description and the real side-effecting action.
///
/// `model_args` and `real_command` are the only required callbacks; every other callback
/// has the default spec.md §3/§4.2 prescribes (`model_requires` → always eligible,
/// `model_precondition` → always true, `model_next_state` → state unchanged,
/// `real_postcondition` → always true).
pub struct Command<S, V> {
    pub(crate) name: String,
    pub(crate) model_requires: Requires<S>,
    pub(crate) model_args: ArgsFn<S, V>,
    pub(crate) model_precondition: Precondition<S, V>,
    pub(crate) model_next_state: NextState<S, V>,
    pub(crate) real_command: RealCommand<V>,
    pub(crate) real_postcondition: Postcondition<S, V>,
}

impl<S, V> fmt::Debug for Command<S, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<S, V> Command<S, V>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    /// Start building a command. `model_args` and `real_command` are mandatory because
    /// there is no sensible default for either (spec.md §3).
    pub fn new(
        name: impl Into<String>,
        model_args: impl Fn(&S) -> ArgSpec<V> + Send + Sync + 'static,
        real_command: impl Fn(&ArgTree<V>) -> Result<V, String> + Send + Sync + 'static,
    ) -> Self {
        Command {
            name: name.into(),
            model_requires: Box::new(|_| true),
            model_args: Box::new(model_args),
            model_precondition: Box::new(|_, _| true),
            model_next_state: Box::new(|state, _, _| state.clone()),
            real_command: Box::new(real_command),
            real_postcondition: Box::new(|_, _, _, _| true),
        }
    }

    pub fn with_requires(mut self, f: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.model_requires = Box::new(f);
        self
    }

    pub fn with_precondition(
        mut self,
        f: impl Fn(&S, &ArgTree<V>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.model_precondition = Box::new(f);
        self
    }

    pub fn with_next_state(
        mut self,
        f: impl Fn(&S, &ArgTree<V>, ResultRef<'_, V>) -> S + Send + Sync + 'static,
    ) -> Self {
        self.model_next_state = Box::new(f);
        self
    }

    /// Alias for [`Command::with_next_state`] matching the legacy `next_state` key
    /// spec.md §9's Open Questions says to document rather than silently support two
    /// diverging behaviours for.
    pub fn with_legacy_next_state(
        self,
        f: impl Fn(&S, &ArgTree<V>, ResultRef<'_, V>) -> S + Send + Sync + 'static,
    ) -> Self {
        self.with_next_state(f)
    }

    pub fn with_postcondition(
        mut self,
        f: impl Fn(&S, &S, &ArgTree<V>, &V) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.real_postcondition = Box::new(f);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

type InitialState<S, V> = Box<dyn Fn(Option<&V>) -> S + Send + Sync>;
type Setup<V> = Box<dyn Fn() -> Result<V, String> + Send + Sync>;
type Cleanup<V> = Box<dyn Fn(Option<&V>) -> anyhow::Result<()> + Send + Sync>;
type GenerateCommand<S> = Box<dyn Fn(&S) -> Option<String> + Send + Sync>;
type SpecPostcondition<S> = Box<dyn Fn(&S) -> bool + Send + Sync>;

/// The full catalogue: commands keyed by name, plus the spec-level callbacks (spec.md §4.2).
///
/// Commands are kept in a [`BTreeMap`] rather than a `HashMap` so that iterating them (as
/// [`Spec::eligible_commands`] does for the uniform-choice fallback in `generator.rs`) is in
/// a fixed, name-sorted order — a `HashMap`'s iteration order is randomized per process, which
/// would make the seeded RNG in `generator.rs::pick_command` index into a differently-ordered
/// list on each run and break spec.md §8's "same seed + same spec ⇒ same program" property.
pub struct Spec<S, V> {
    pub(crate) commands: BTreeMap<String, Command<S, V>>,
    pub(crate) initial_state: InitialState<S, V>,
    pub(crate) setup: Option<Setup<V>>,
    pub(crate) cleanup: Option<Cleanup<V>>,
    pub(crate) generate_command: Option<GenerateCommand<S>>,
    pub(crate) spec_postcondition: SpecPostcondition<S>,
}

impl<S, V> Spec<S, V>
where
    S: Clone + 'static,
    V: Clone + 'static,
{
    /// Create a spec with the given `model_initial_state` callback and no commands yet.
    pub fn new(initial_state: impl Fn(Option<&V>) -> S + Send + Sync + 'static) -> Self {
        Spec {
            commands: BTreeMap::new(),
            initial_state: Box::new(initial_state),
            setup: None,
            cleanup: None,
            generate_command: None,
            spec_postcondition: Box::new(|_| true),
        }
    }

    pub fn with_command(mut self, command: Command<S, V>) -> Self {
        self.commands.insert(command.name.clone(), command);
        self
    }

    pub fn with_setup(mut self, f: impl Fn() -> Result<V, String> + Send + Sync + 'static) -> Self {
        self.setup = Some(Box::new(f));
        self
    }

    pub fn with_cleanup(
        mut self,
        f: impl Fn(Option<&V>) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.cleanup = Some(Box::new(f));
        self
    }

    pub fn with_generate_command(
        mut self,
        f: impl Fn(&S) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.generate_command = Some(Box::new(f));
        self
    }

    pub fn with_spec_postcondition(
        mut self,
        f: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.spec_postcondition = Box::new(f);
        self
    }

    pub fn command(&self, name: &str) -> Result<&Command<S, V>, LinearCheckError> {
        self.commands.get(name).ok_or_else(|| LinearCheckError::UnknownCommand(name.to_string()))
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Command names whose `model_requires` holds against `state` — the fallback pool used
    /// when `generate_command` is absent or declines to pick (spec.md §4.4 step 2a).
    pub fn eligible_commands(&self, state: &S) -> Vec<&str> {
        self.commands
            .values()
            .filter(|c| (c.model_requires)(state))
            .map(|c| c.name.as_str())
            .collect()
    }

    pub fn initial_state(&self, setup_value: Option<&V>) -> S {
        (self.initial_state)(setup_value)
    }

    pub fn run_setup(&self) -> Option<Result<V, String>> {
        self.setup.as_ref().map(|f| f())
    }

    pub fn run_cleanup(&self, setup_value: Option<&V>) -> Option<anyhow::Result<()>> {
        self.cleanup.as_ref().map(|f| f(setup_value))
    }

    pub fn check_spec_postcondition(&self, state: &S) -> bool {
        (self.spec_postcondition)(state)
    }
}

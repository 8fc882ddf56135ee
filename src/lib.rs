//! A symbolic, model-based testing engine for stateful systems.
//!
//! A user describes a [`Spec`] — a catalogue of [`Command`]s plus an abstract model of how
//! they evolve state — and [`run_spec`] searches for a program (a sequence, and optionally a
//! set of concurrent threads, of command invocations) whose real execution cannot be
//! explained by any valid trajectory of the model. A failing program is shrunk to a minimal
//! witness before being reported.
//!
//! The pipeline, leaves first:
//! [`handle`] (symbolic references) → [`command`] (the user's catalogue) → [`argspec`]
//! (argument generation) → [`generator`] (program generation under preconditions) →
//! [`shrink`] (well-formedness-preserving shrinking) → [`runner`] (real execution) →
//! [`linearize`] (accept iff some interleaving explains the trace) → [`driver`] (ties it all
//! together, with setup/retry/cleanup).

pub mod argspec;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod generated;
pub mod generator;
pub mod handle;
pub mod linearize;
pub mod program;
pub mod report;
pub mod runner;
pub mod shrink;

pub use argspec::{ArgSpec, ArgTree};
pub use command::{Command, ResultRef, Spec};
pub use config::Options;
pub use driver::run_spec;
pub use error::LinearCheckError;
pub use handle::{Bindings, Handle, Outcome};
pub use program::{Invocation, Program};
pub use report::Report;

//! Crisis simulation core.
//!
//! A community reacts to a PR crisis, a human answers on behalf of the
//! company, a rubric scores the answer and a reputation score moves until
//! the crisis resolves or turns into a catastrophe. Between the reaction
//! and the answer the session is suspended in durable storage, so a
//! front end can return control to the human and resume later, even
//! after a restart.

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluation;
pub mod event;
pub mod generator;
pub mod prompts;
pub mod reputation;
pub mod round;
pub mod state;
pub mod store;
pub mod termination;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointStore, DriverPhase};
pub use driver::{RoundResultView, SimulationDriver, StartView};
pub use error::{SimError, SimResult};
pub use generator::{NarrativeGenerator, ScriptedGenerator};
pub use round::{RoundEngine, RoundOutcome, Suspension};
pub use state::{EvalLabel, Evaluation, SimState, Status};

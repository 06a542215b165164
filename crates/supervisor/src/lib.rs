//! Process and probe machinery behind the container entrypoint.
//!
//! - [`probe`] polls TCP dependencies until they accept connections.
//! - [`steps`] runs one-shot commands (migrations, asset collection).
//! - [`service`] and [`registry`] keep background processes alive.
//! - [`foreground`] runs the main server and relays termination signals.
//! - [`sequencer`] ties them together in the fixed startup order.

pub mod error;
pub mod foreground;
pub mod probe;
pub mod process;
pub mod registry;
pub mod sequencer;
pub mod service;
pub mod signal;
pub mod steps;

pub use error::SupervisorError;
pub use registry::Supervisor;
pub use sequencer::{
    Prepared, SequenceResult, Sequencer, SequencerOptions, StartupPhase, StartupSnapshot,
};

//! Asynchronous generation pipeline.
//!
//! - [`poller::JobPoller`] follows one remote job to a terminal status
//!   with a bounded number of fresh reads.
//! - [`precompositor::BackgroundPreCompositor`] speculatively builds the
//!   garment grid while the user is still choosing.
//! - [`orchestrator::GenerationOrchestrator`] sequences the mannequin and
//!   render stages and owns the working copy's lifecycle.

pub mod composite;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod precompositor;

pub use error::{GenerationError, PollError};

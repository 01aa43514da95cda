//! Domain model, collaborator contracts and configuration shared by
//! every atelier crate.
//!
//! Nothing in here performs I/O. The store traits in [`store`] are
//! implemented by `atelier-remote` in production and by in-memory fakes
//! in tests.

pub mod config;
pub mod error;
pub mod failure;
pub mod job;
pub mod selection;
pub mod store;
pub mod types;

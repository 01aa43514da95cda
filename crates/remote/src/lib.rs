//! HTTP implementations of the generation core's collaborator traits.
//!
//! [`RemoteClient`] talks to a REST backend: table endpoints under
//! `/rest/v1`, object storage under `/storage/v1` and the job runner
//! function under `/functions/v1`.

pub mod client;
pub mod config;
pub mod error;
mod jobs;
mod outfits;
mod storage;

pub use client::RemoteClient;
pub use config::RemoteConfig;
pub use error::RemoteError;

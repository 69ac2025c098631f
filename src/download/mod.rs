//! Resource downloads
//!
//! One [`ResourceDownloadCoordinator`] per remote file. All coordinators share
//! one cache and one [`ConcurrencyGate`](crate::gate::ConcurrencyGate), so at
//! most `capacity` whole resources download at a time.

pub mod coordinator;
pub mod source;

pub use coordinator::{DownloadOutcome, DownloadState, ResourceDownloadCoordinator, VersionCached};
pub use source::{content_token, FetchedResource, HttpSource, ResourceSource};

//! Most-recently-used list shared across devices
//!
//! Each device keeps its own visits locally and publishes its top-N as a
//! [`MachineSnapshot`] in a replicated settings container. The
//! [`MruMergeEngine`] folds the local list and every peer's snapshot into a
//! single [`MergedMruView`].

pub mod engine;
pub mod local;
pub mod record;
pub mod settings;

pub use engine::{resolve_machine_name, MergedMruStream, MruMergeEngine, MACHINE_NAME_ENV};
pub use local::{LocalMruStore, MemoryMruStore};
pub use record::{merge, MachineSnapshot, MergedMruView, MruRecord, DEFAULT_TOP_N};
pub use settings::{DirectorySettings, MemorySettings, SettingsContainer, DEFAULT_POLL_INTERVAL};

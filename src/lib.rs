//! agenda-cache - offline cache for conference agendas
//!
//! Stale-while-revalidate caching of agenda data, bounded-concurrency
//! resource downloads, and a most-recently-used list merged across devices.

pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod gate;
pub mod mru;

pub use error::{AgendaError, AgendaResult};

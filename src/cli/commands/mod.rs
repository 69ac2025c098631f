//! CLI command implementations

pub mod cache;
mod common;
pub mod config;
pub mod fetch;
pub mod mru;
pub mod status;

pub use cache::execute as cache;
pub use config::execute as config;
pub use fetch::execute as fetch;
pub use mru::execute as mru;
pub use status::execute as status;

pub mod common;
pub mod config;
pub mod list;
pub mod recover;
pub mod stats;
pub mod sync;

pub mod cache;
pub mod command_log;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;

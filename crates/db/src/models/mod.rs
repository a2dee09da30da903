pub mod app_state;
pub mod git_command_log;
pub mod repository;

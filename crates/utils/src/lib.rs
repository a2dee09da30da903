pub mod assets;
pub mod diff;
pub mod log_msg;
pub mod path;
pub mod port_file;
pub mod response;
pub mod shell;

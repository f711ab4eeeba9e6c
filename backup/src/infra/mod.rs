//! Infrastructure layer

pub mod archive;
pub mod env_file;
pub mod op_cli;
pub mod secrets;

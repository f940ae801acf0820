//! CLI command implementations

pub mod convert;
pub mod detect;
pub mod init;
pub mod schema;
pub mod validate;
pub mod watch;

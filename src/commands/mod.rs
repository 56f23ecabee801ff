//! CLI command handlers.

mod bringonline;
mod copy;
mod version;

pub(crate) use bringonline::run_bringonline_command;
pub(crate) use copy::run_copy_command;
pub(crate) use version::run_version_command;

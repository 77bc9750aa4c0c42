//! Interactive command surface: stdin/stdout REPL over the job manager.

pub mod command;
pub mod repl;

pub use command::{Command, DEFAULT_WAIT, HELP};
pub use repl::Repl;

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, QueryView};
pub use commands::run;

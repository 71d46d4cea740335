pub mod cli;
pub mod load_config;
pub mod notion;

pub use cli::{run, Cli, Commands, PreviewFormat};

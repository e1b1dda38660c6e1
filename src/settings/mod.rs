//! Runtime configuration: a TOML file read through `config`, selected with
//! `--settings` on the command line.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;

pub mod args;

use clap::{CommandFactory, Parser};
pub use args::Arguments;

pub fn parse() -> Arguments {
    Arguments::parse()
}

/// One-line usage text, printed after a failed run.
pub fn usage() -> String {
    Arguments::command().render_usage().to_string()
}

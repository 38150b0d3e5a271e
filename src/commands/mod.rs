//! # CLI Subcommand Drivers
//!
//! The two tool entry points live here; the binaries only parse arguments
//! and hand over a config record, so nothing in the drivers reaches for
//! global state.

pub mod dump;
pub mod cat;

#[derive(thiserror::Error,Debug)]
pub enum CommandError {
    #[error("Command could not be interpreted")]
    InvalidCommand,
    #[error("One of the parameters was out of range")]
    OutOfRange,
    #[error("File \"{0}\" already exists. Specify \"-r\" to retry reads.")]
    ImageExists(String),
    #[error("File \"{0}\" does not exist; a retry needs a prior image")]
    ImageMissing(String),
    #[error("raw floppy access is not supported on this platform")]
    Unsupported
}

//! Error types surfaced by the engine.
//!
//! Only the stalls-search driver recovers from anything (it treats a failed
//! attempt as infeasible and moves to the next budget); every other failure
//! propagates out of the optimize call.

use crate::isa::RegClass;

/// Errors produced by an optimize call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed assembly input.
    #[error("line {line}: {message}")]
    Parse {
        /// Source line number (1-based).
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// A mnemonic the architecture tables do not describe.
    #[error("line {line}: unknown mnemonic `{mnemonic}`")]
    UnknownMnemonic {
        /// Source line number.
        line: usize,
        /// The offending mnemonic.
        mnemonic: String,
    },

    /// A register is read but has no producer and is not a declared input.
    #[error("line {line}: `{name}` is read but never written and is not a declared input")]
    UndefinedRead {
        /// Source line number.
        line: usize,
        /// The register name as written.
        name: String,
    },

    /// A symbolic register is used with two incompatible classes.
    #[error(
        "symbolic register `{name}` is used both as {first} and as {second}; \
         add a typing hint for `{name}`"
    )]
    AmbiguousClass {
        /// The symbolic name.
        name: String,
        /// Class required by one use.
        first: RegClass,
        /// Conflicting class required by another use.
        second: RegClass,
    },

    /// Invalid configuration, reported at binding time.
    #[error("configuration: {0}")]
    Config(String),

    /// The stalls search exhausted its budget cap.
    #[error("no schedule found within {cap} stalls")]
    Infeasible {
        /// The configured cap.
        cap: u32,
    },

    /// The external solver failed outright.
    #[error("solver failure: {0}")]
    Solver(String),

    /// The output failed the independent self-check. Internal bug.
    #[error("self-check failed: {0}; this is a bug, please report it")]
    SelfCheck(String),
}

/// Convenience alias.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Shorthand for a located parse error.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Error::Parse {
            line,
            message: message.into(),
        }
    }
}

//! Error types for tokenizing, registration and dispatch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the argument tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    /// Quotes do not balance: a span was never closed, or a closing quote
    /// appeared with nothing open.
    #[error("quote mismatch at character {position}")]
    QuoteMismatch {
        /// Character index where the imbalance was detected.
        position: usize,
    },
}

/// Errors raised by the command trie.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    /// The trie was structurally modified while a cursor was iterating it.
    #[error("command trie modified during iteration (expected version {expected}, found {found})")]
    ConcurrentModification {
        /// Version captured when the iteration started.
        expected: u64,
        /// Version observed at the failing step.
        found: u64,
    },
}

/// Errors raised while building or registering a command.
///
/// These are programming or configuration mistakes, never bad user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The swappable parameter set is invalid.
    #[error("invalid swappable parameters for `{command}`: {reason}")]
    SwapConfiguration {
        /// Display name of the offending command.
        command: String,
        /// What is wrong with the set.
        reason: String,
    },

    /// The command definition itself is malformed.
    #[error("invalid command `{command}`: {reason}")]
    InvalidCommand {
        /// Display name of the offending command.
        command: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Hard failures of a dispatch call.
///
/// Everything caused by a candidate not fitting the input is reported through
/// [`crate::NoMatchFound`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The input could not be tokenized.
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    /// The winning command was removed while the dispatch was in flight.
    #[error(transparent)]
    Trie(#[from] TrieError),
}

/// Errors loading or validating a [`crate::DispatchConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a config file.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The values parsed but do not make sense together.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

//! Text-command dispatch engine.
//!
//! Takes a line of free-form text, splits it into arguments respecting nested
//! quotes, finds every registered command whose name path prefixes it, runs
//! each through its checks and executes the best one.
//!
//! # Pipeline
//!
//! 1. [`tokenize`] the line. Unbalanced quotes abort the dispatch.
//! 2. Walk the [`CommandTrie`] along the tokens. Every command on the walk is
//!    a candidate; the rest of the tokens are its arguments.
//! 3. Evaluate each candidate: enabled, context, grouped preconditions,
//!    arity, conversion through a [`TypeReader`], parameter preconditions.
//! 4. Rank the matches (priority, path length, fewer defaults, registration
//!    order) and hand the winner to the [`CommandExecutor`], or report the
//!    candidate that got furthest as [`NoMatchFound`].
//!
//! # Swapped arguments
//!
//! A command may mark parameter positions as swappable. Registration then adds
//! one variant per reordering, each with a priority penalty proportional to
//! the number of swaps it takes to undo. The handler always sees the arguments
//! in declaration order.
//!
//! ```rust,ignore
//! use parley_dispatch::{
//!     Command, CommandContext, CommandService, ExecutionResult, Parameter, executor_fn,
//! };
//!
//! let service = CommandService::with_executor(executor_fn(|command, args, _| {
//!     println!("{} {:?}", command.name(), args);
//!     ExecutionResult::success()
//! }));
//!
//! service.register(
//!     Command::builder("give")
//!         .parameter(Parameter::new("item", "string"))
//!         .parameter(Parameter::new("count", "int"))
//!         .swappable([0, 1])
//!         .build()?,
//! )?;
//!
//! // Both run `give` with ["apple", 3].
//! service.dispatch("give apple 3", &CommandContext::default()).await?;
//! service.dispatch("give 3 apple", &CommandContext::default()).await?;
//! ```

mod command;
mod config;
mod context;
mod error;
mod executor;
mod groups;
mod matcher;
mod precondition;
mod reader;
mod service;
mod swap;
mod tokenizer;
mod trie;

#[cfg(test)]
mod tests;

pub use command::{Command, CommandBuilder, CommandId, NamePath, Parameter};
pub use config::{DispatchConfig, NameComparer};
pub use context::{CommandContext, ContextConstraint};
pub use error::{ConfigError, DispatchError, RegistrationError, TokenizeError, TrieError};
pub use executor::{
    CommandExecutor, ExecutionResult, FnExecutor, executor_fn, format_usage, strip_prefix,
};
pub use groups::{
    CheckFailure, CheckGroup, CheckResult, GroupOperator, Groupable, evaluate_groups,
};
pub use matcher::{CandidateFailure, MatchCandidate, MatchStage};
pub use precondition::{
    FnParameterPrecondition, FnPrecondition, ParameterPrecondition, Precondition,
    parameter_precondition_fn, precondition_fn,
};
pub use reader::{
    BoolReader, FloatReader, IntReader, StringReader, TypeReader, TypeReaderRegistry,
};
pub use service::{
    CandidateReport, CommandMatch, CommandService, DispatchOutcome, MatchOutcome, NoMatchFound,
};
pub use swap::{MAX_SWAPPABLE_PARAMETERS, Swapper, create_swappers};
pub use tokenizer::{TokenizerOptions, tokenize};
pub use trie::{CommandTrie, NodeKey, TrieCursor};

//! Command execution seam and invocation helpers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::{Command, Parameter};
use crate::context::CommandContext;

/// Result of running a command handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The handler completed.
    Success {
        /// Optional value produced by the handler.
        output: Option<Value>,
    },

    /// The handler ran but reported a failure.
    Failed {
        /// Caller-facing explanation.
        reason: String,
    },
}

impl ExecutionResult {
    /// Success without output.
    pub fn success() -> Self {
        Self::Success { output: None }
    }

    /// Success carrying `output`.
    pub fn with_output(output: Value) -> Self {
        Self::Success {
            output: Some(output),
        }
    }

    /// Failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Check if the handler completed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Runs the handler of a matched command.
///
/// Invoked exactly once per successful dispatch, with the declared (source)
/// command and its arguments in declaration order.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(
        &self,
        command: &Arc<Command>,
        arguments: Vec<Value>,
        context: &CommandContext,
    ) -> ExecutionResult;
}

/// Synchronous closure adapter for [`CommandExecutor`].
pub struct FnExecutor<F> {
    execute: F,
}

impl<F> fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> CommandExecutor for FnExecutor<F>
where
    F: Fn(&Arc<Command>, Vec<Value>, &CommandContext) -> ExecutionResult + Send + Sync,
{
    async fn execute(
        &self,
        command: &Arc<Command>,
        arguments: Vec<Value>,
        context: &CommandContext,
    ) -> ExecutionResult {
        (self.execute)(command, arguments, context)
    }
}

/// Wrap a synchronous closure as a shared [`CommandExecutor`].
pub fn executor_fn<F>(execute: F) -> Arc<dyn CommandExecutor>
where
    F: Fn(&Arc<Command>, Vec<Value>, &CommandContext) -> ExecutionResult + Send + Sync + 'static,
{
    Arc::new(FnExecutor { execute })
}

/// Strip a leading invocation marker such as `/` or `!`.
///
/// Returns the rest of the line, or `None` if the input does not start with
/// `prefix` or nothing follows it.
pub fn strip_prefix<'a>(input: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = input.trim_start().strip_prefix(prefix)?.trim();
    if rest.is_empty() { None } else { Some(rest) }
}

/// Usage line for a command, e.g. `ban <user> [reason...]`.
pub fn format_usage(command: &Command) -> String {
    let hints: Vec<String> = command.parameters().iter().map(parameter_hint).collect();
    if hints.is_empty() {
        command.name()
    } else {
        format!("{} {}", command.name(), hints.join(" "))
    }
}

fn parameter_hint(parameter: &Parameter) -> String {
    let repeat = if parameter.is_remainder() { "..." } else { "" };
    if parameter.is_optional() {
        format!("[{}{repeat}]", parameter.name())
    } else {
        format!("<{}{repeat}>", parameter.name())
    }
}

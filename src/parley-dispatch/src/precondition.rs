//! Command- and parameter-level preconditions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::{Command, Parameter};
use crate::context::CommandContext;
use crate::groups::{CheckGroup, CheckResult, Groupable};

/// A check that must pass before a command may run.
#[async_trait]
pub trait Precondition: Groupable + Send + Sync {
    /// Decide whether `command` may run in `context`.
    async fn check(&self, command: &Command, context: &CommandContext) -> CheckResult;
}

/// A check applied to one converted argument value.
#[async_trait]
pub trait ParameterPrecondition: Groupable + Send + Sync {
    /// Decide whether `value` is acceptable for `parameter`.
    async fn check(
        &self,
        parameter: &Parameter,
        value: &Value,
        context: &CommandContext,
    ) -> CheckResult;
}

/// Synchronous closure adapter for [`Precondition`].
pub struct FnPrecondition<F> {
    group: CheckGroup,
    check: F,
}

impl<F> fmt::Debug for FnPrecondition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPrecondition")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl<F> Groupable for FnPrecondition<F> {
    fn group(&self) -> CheckGroup {
        self.group.clone()
    }
}

#[async_trait]
impl<F> Precondition for FnPrecondition<F>
where
    F: Fn(&Command, &CommandContext) -> CheckResult + Send + Sync,
{
    async fn check(&self, command: &Command, context: &CommandContext) -> CheckResult {
        (self.check)(command, context)
    }
}

/// Wrap a synchronous closure as a shared [`Precondition`].
pub fn precondition_fn<F>(group: CheckGroup, check: F) -> Arc<dyn Precondition>
where
    F: Fn(&Command, &CommandContext) -> CheckResult + Send + Sync + 'static,
{
    Arc::new(FnPrecondition { group, check })
}

/// Synchronous closure adapter for [`ParameterPrecondition`].
pub struct FnParameterPrecondition<F> {
    group: CheckGroup,
    check: F,
}

impl<F> fmt::Debug for FnParameterPrecondition<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnParameterPrecondition")
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

impl<F> Groupable for FnParameterPrecondition<F> {
    fn group(&self) -> CheckGroup {
        self.group.clone()
    }
}

#[async_trait]
impl<F> ParameterPrecondition for FnParameterPrecondition<F>
where
    F: Fn(&Parameter, &Value, &CommandContext) -> CheckResult + Send + Sync,
{
    async fn check(
        &self,
        parameter: &Parameter,
        value: &Value,
        context: &CommandContext,
    ) -> CheckResult {
        (self.check)(parameter, value, context)
    }
}

/// Wrap a synchronous closure as a shared [`ParameterPrecondition`].
pub fn parameter_precondition_fn<F>(group: CheckGroup, check: F) -> Arc<dyn ParameterPrecondition>
where
    F: Fn(&Parameter, &Value, &CommandContext) -> CheckResult + Send + Sync + 'static,
{
    Arc::new(FnParameterPrecondition { group, check })
}

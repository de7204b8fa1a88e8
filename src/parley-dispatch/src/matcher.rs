//! Candidate evaluation and ranking.
//!
//! Each candidate walks a fixed pipeline and stops at the first stage it
//! fails: enabled, context, command preconditions, arity, conversion,
//! parameter preconditions. Matched candidates are ranked; when none matched
//! the candidate that got furthest explains the failure.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::command::{Command, Parameter};
use crate::context::{CommandContext, ContextConstraint};
use crate::groups::evaluate_groups;
use crate::reader::TypeReaderRegistry;

/// Pipeline stage a candidate reached. Later stages compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchStage {
    Enabled,
    Context,
    Preconditions,
    Arity,
    Conversion,
    ParameterPreconditions,
    /// Passed every stage.
    Matched,
}

/// Why a candidate was disqualified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CandidateFailure {
    #[error("command is disabled")]
    Disabled,

    #[error("command is only available in {}, not `{actual}`", .required.join(", "))]
    InvalidContext {
        /// Context kinds the command accepts.
        required: Vec<String>,
        /// Kind of the invoking context.
        actual: String,
    },

    #[error("{reason}")]
    PreconditionFailed { reason: String },

    #[error("{}", arity_message(.min, .max, .actual))]
    ArityMismatch {
        /// Fewest tokens accepted.
        min: usize,
        /// Most tokens accepted; `None` when unbounded.
        max: Option<usize>,
        /// Tokens supplied.
        actual: usize,
    },

    #[error("`{parameter}` takes {expected} arguments, got {actual}")]
    IncompleteArgument {
        parameter: String,
        /// Tokens the parameter consumes.
        expected: usize,
        /// Tokens left for it.
        actual: usize,
    },

    #[error("invalid value for `{parameter}`: {reason}")]
    ConversionFailed { parameter: String, reason: String },

    #[error("`{parameter}`: {reason}")]
    ParameterPreconditionFailed { parameter: String, reason: String },
}

fn arity_message(min: &usize, max: &Option<usize>, actual: &usize) -> String {
    match *max {
        Some(max) if *min == max => format!("expected {min} arguments, got {actual}"),
        Some(max) => format!("expected {min} to {max} arguments, got {actual}"),
        None => format!("expected at least {min} arguments, got {actual}"),
    }
}

impl CandidateFailure {
    /// Stage at which this failure stops a candidate.
    pub fn stage(&self) -> MatchStage {
        match self {
            Self::Disabled => MatchStage::Enabled,
            Self::InvalidContext { .. } => MatchStage::Context,
            Self::PreconditionFailed { .. } => MatchStage::Preconditions,
            Self::ArityMismatch { .. } | Self::IncompleteArgument { .. } => MatchStage::Arity,
            Self::ConversionFailed { .. } => MatchStage::Conversion,
            Self::ParameterPreconditionFailed { .. } => MatchStage::ParameterPreconditions,
        }
    }
}

/// One command considered for a single dispatch.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    /// Command as stored in the trie (possibly a swapped variant).
    pub command: Arc<Command>,
    /// Number of input tokens consumed by the command path.
    pub consumed_path_length: usize,
    /// Tokens left over for the parameters.
    pub remaining_tokens: Vec<String>,
    /// Position of the command in registration order.
    pub registration_order: usize,
    /// Stage reached so far.
    pub stage: MatchStage,
    /// Set once the candidate is disqualified.
    pub failure: Option<CandidateFailure>,
    /// Converted values in the command's parameter order.
    pub arguments: Vec<Value>,
    /// Number of parameters filled from their default.
    pub defaulted: usize,
}

impl MatchCandidate {
    pub fn new(
        command: Arc<Command>,
        consumed_path_length: usize,
        remaining_tokens: Vec<String>,
        registration_order: usize,
    ) -> Self {
        Self {
            command,
            consumed_path_length,
            remaining_tokens,
            registration_order,
            stage: MatchStage::Enabled,
            failure: None,
            arguments: Vec::new(),
            defaulted: 0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.stage == MatchStage::Matched
    }
}

enum Binding<'t> {
    Tokens(&'t [String]),
    Default(Value),
}

/// Runs candidates through the pipeline.
pub(crate) struct CandidateEvaluator<'a> {
    pub(crate) readers: &'a TypeReaderRegistry,
    pub(crate) separator: char,
    pub(crate) ignore_extra_arguments: bool,
}

impl CandidateEvaluator<'_> {
    /// Evaluate `candidate`, recording the stage reached and any failure.
    pub(crate) async fn evaluate(
        &self,
        mut candidate: MatchCandidate,
        context: &CommandContext,
    ) -> MatchCandidate {
        match self.run(&mut candidate, context).await {
            Ok(()) => candidate.stage = MatchStage::Matched,
            Err(failure) => {
                trace!(
                    "Candidate {} rejected at {:?}: {}",
                    candidate.command.name(),
                    failure.stage(),
                    failure
                );
                candidate.stage = failure.stage();
                candidate.failure = Some(failure);
            }
        }
        candidate
    }

    async fn run(
        &self,
        candidate: &mut MatchCandidate,
        context: &CommandContext,
    ) -> Result<(), CandidateFailure> {
        let command = Arc::clone(&candidate.command);

        if !command.is_enabled() {
            return Err(CandidateFailure::Disabled);
        }
        candidate.stage = MatchStage::Context;

        if let ContextConstraint::Kinds(kinds) = command.context()
            && !command.context().allows(&context.kind)
        {
            return Err(CandidateFailure::InvalidContext {
                required: kinds.clone(),
                actual: context.kind.clone(),
            });
        }
        candidate.stage = MatchStage::Preconditions;

        let source = command.source();
        evaluate_groups(command.preconditions(), |precondition| {
            precondition.check(source, context)
        })
        .await
        .map_err(|failure| CandidateFailure::PreconditionFailed {
            reason: failure.reason,
        })?;
        candidate.stage = MatchStage::Arity;

        let remaining = candidate.remaining_tokens.clone();
        let bindings = bind(command.parameters(), &remaining, self.ignore_extra_arguments)?;
        candidate.stage = MatchStage::Conversion;

        let mut values = Vec::with_capacity(bindings.len());
        let mut defaulted = Vec::with_capacity(bindings.len());
        for (parameter, binding) in command.parameters().iter().zip(bindings) {
            match binding {
                Binding::Default(value) => {
                    values.push(value);
                    defaulted.push(true);
                }
                Binding::Tokens(tokens) => {
                    values.push(self.convert(parameter, tokens, context).await?);
                    defaulted.push(false);
                }
            }
        }
        candidate.stage = MatchStage::ParameterPreconditions;

        for ((parameter, value), is_default) in
            command.parameters().iter().zip(&values).zip(&defaulted)
        {
            if *is_default {
                continue;
            }
            evaluate_groups(parameter.preconditions(), |precondition| {
                precondition.check(parameter, value, context)
            })
            .await
            .map_err(|failure| CandidateFailure::ParameterPreconditionFailed {
                parameter: parameter.name().to_string(),
                reason: failure.reason,
            })?;
        }

        candidate.defaulted = defaulted.iter().filter(|d| **d).count();
        candidate.arguments = values;
        Ok(())
    }

    async fn convert(
        &self,
        parameter: &Parameter,
        tokens: &[String],
        context: &CommandContext,
    ) -> Result<Value, CandidateFailure> {
        let failed = |reason: String| CandidateFailure::ConversionFailed {
            parameter: parameter.name().to_string(),
            reason,
        };

        let reader = self.readers.get(parameter.type_name()).ok_or_else(|| {
            failed(format!(
                "no type reader registered for `{}`",
                parameter.type_name()
            ))
        })?;

        if parameter.is_collection() {
            let mut items = Vec::with_capacity(tokens.len());
            for token in tokens {
                items.push(reader.read(token, parameter, context).await.map_err(failed)?);
            }
            return Ok(Value::Array(items));
        }

        let joined;
        let input = match tokens {
            [single] => single.as_str(),
            _ => {
                joined = tokens.join(&self.separator.to_string());
                joined.as_str()
            }
        };
        reader.read(input, parameter, context).await.map_err(failed)
    }
}

/// Fewest and most tokens `parameters` accept.
pub(crate) fn arity(parameters: &[Parameter], ignore_extra_arguments: bool) -> (usize, Option<usize>) {
    let min = parameters
        .iter()
        .filter(|p| !p.is_optional())
        .map(|p| p.length().unwrap_or(1))
        .sum();
    let max = if ignore_extra_arguments {
        None
    } else {
        parameters
            .iter()
            .map(Parameter::length)
            .sum::<Option<usize>>()
    };
    (min, max)
}

/// Assign tokens to parameters left to right.
///
/// An optional parameter only takes tokens that the required parameters after
/// it do not need. A fixed-length parameter never binds a partial run.
fn bind<'t>(
    parameters: &[Parameter],
    tokens: &'t [String],
    ignore_extra_arguments: bool,
) -> Result<Vec<Binding<'t>>, CandidateFailure> {
    let (min, max) = arity(parameters, ignore_extra_arguments);
    if tokens.len() < min || max.is_some_and(|max| tokens.len() > max) {
        return Err(CandidateFailure::ArityMismatch {
            min,
            max,
            actual: tokens.len(),
        });
    }

    let mut bindings = Vec::with_capacity(parameters.len());
    let mut incomplete = None;
    let mut rest = tokens;
    for (index, parameter) in parameters.iter().enumerate() {
        let reserved = arity(&parameters[index + 1..], true).0;
        let available = rest.len().saturating_sub(reserved);
        let wanted = parameter.length().unwrap_or(available);

        if wanted > 0 && available >= wanted {
            let (taken, remaining) = rest.split_at(wanted);
            bindings.push(Binding::Tokens(taken));
            rest = remaining;
        } else if let Some(default) = parameter.default_value() {
            if available > 0 && incomplete.is_none() {
                incomplete = Some((parameter, available));
            }
            bindings.push(Binding::Default(default.clone()));
        } else {
            return Err(CandidateFailure::ArityMismatch {
                min,
                max,
                actual: tokens.len(),
            });
        }
    }

    if !rest.is_empty() && !ignore_extra_arguments {
        return Err(match incomplete {
            Some((parameter, available)) => CandidateFailure::IncompleteArgument {
                parameter: parameter.name().to_string(),
                expected: parameter.length().unwrap_or(1),
                actual: available,
            },
            None => CandidateFailure::ArityMismatch {
                min,
                max,
                actual: tokens.len(),
            },
        });
    }
    Ok(bindings)
}

/// Ranking order: higher priority, longer path, fewer defaults, earlier
/// registration.
pub(crate) fn compare_matches(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    b.command
        .priority()
        .cmp(&a.command.priority())
        .then_with(|| b.consumed_path_length.cmp(&a.consumed_path_length))
        .then_with(|| a.defaulted.cmp(&b.defaulted))
        .then_with(|| a.registration_order.cmp(&b.registration_order))
}

/// The winning candidate, if any matched.
pub(crate) fn best_match(candidates: &[MatchCandidate]) -> Option<&MatchCandidate> {
    candidates
        .iter()
        .filter(|c| c.is_matched())
        .min_by(|a, b| compare_matches(a, b))
}

/// The failed candidate that progressed furthest; ties go to earlier
/// registration, then to the longer path.
pub(crate) fn best_failure(candidates: &[MatchCandidate]) -> Option<&MatchCandidate> {
    candidates
        .iter()
        .filter(|c| c.failure.is_some())
        .min_by(|a, b| {
            b.stage
                .cmp(&a.stage)
                .then_with(|| a.registration_order.cmp(&b.registration_order))
                .then_with(|| b.consumed_path_length.cmp(&a.consumed_path_length))
        })
}

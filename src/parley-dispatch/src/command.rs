//! Command and parameter definitions.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::Value;

use crate::context::ContextConstraint;
use crate::error::RegistrationError;
use crate::precondition::{ParameterPrecondition, Precondition};
use crate::swap::Swapper;

/// Process-unique command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(u64);

impl CommandId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One alias under which a command is reachable, e.g. `tag create`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamePath(Vec<String>);

impl NamePath {
    /// Create a path from explicit segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a whitespace-separated path.
    pub fn parse(path: &str) -> Self {
        Self::new(path.split_whitespace())
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for NamePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// A declared command parameter.
#[derive(Clone)]
pub struct Parameter {
    name: String,
    type_name: String,
    length: Option<usize>,
    is_collection: bool,
    default_value: Option<Value>,
    preconditions: Vec<Arc<dyn ParameterPrecondition>>,
}

impl Parameter {
    /// A single-token parameter converted by the reader registered for `type_name`.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            length: Some(1),
            is_collection: false,
            default_value: None,
            preconditions: Vec::new(),
        }
    }

    /// Builder: absorb every remaining token.
    #[must_use]
    pub fn remainder(mut self) -> Self {
        self.length = None;
        self
    }

    /// Builder: consume exactly `length` tokens.
    #[must_use]
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Builder: convert each consumed token separately into an array.
    #[must_use]
    pub fn collection(mut self) -> Self {
        self.is_collection = true;
        self
    }

    /// Builder: make the parameter optional with the given default.
    #[must_use]
    pub fn optional(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Builder: add a parameter precondition.
    #[must_use]
    pub fn with_precondition(mut self, precondition: Arc<dyn ParameterPrecondition>) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Tokens consumed; `None` for a remainder parameter.
    pub fn length(&self) -> Option<usize> {
        self.length
    }

    pub fn is_remainder(&self) -> bool {
        self.length.is_none()
    }

    pub fn is_collection(&self) -> bool {
        self.is_collection
    }

    pub fn is_optional(&self) -> bool {
        self.default_value.is_some()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    pub fn preconditions(&self) -> &[Arc<dyn ParameterPrecondition>] {
        &self.preconditions
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("length", &self.length)
            .field("is_collection", &self.is_collection)
            .field("default_value", &self.default_value)
            .field("preconditions", &self.preconditions.len())
            .finish()
    }
}

/// Link from a swapped-argument variant back to the command it was made from.
#[derive(Debug)]
pub(crate) struct SwapVariant {
    pub(crate) source: Arc<Command>,
    pub(crate) swapper: Arc<Swapper>,
}

/// A registered command.
///
/// Built with [`CommandBuilder`]. Immutable apart from the enabled flag.
pub struct Command {
    id: CommandId,
    name_paths: Vec<NamePath>,
    description: Option<String>,
    priority: i32,
    context: ContextConstraint,
    parameters: Vec<Parameter>,
    preconditions: Vec<Arc<dyn Precondition>>,
    swappable: Vec<usize>,
    enabled: AtomicBool,
    variant: Option<SwapVariant>,
}

impl Command {
    /// Start building a command reachable under `path`.
    pub fn builder(path: impl Into<NamePath>) -> CommandBuilder {
        CommandBuilder::new(path)
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Primary name (the first path).
    pub fn name(&self) -> String {
        self.name_paths
            .first()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    pub fn name_paths(&self) -> &[NamePath] {
        &self.name_paths
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn context(&self) -> &ContextConstraint {
        &self.context
    }

    /// Parameters in the order arguments are typed.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn preconditions(&self) -> &[Arc<dyn Precondition>] {
        &self.preconditions
    }

    /// Parameter positions that may be given in any order.
    pub fn swappable(&self) -> &[usize] {
        &self.swappable
    }

    /// Whether the command may currently be dispatched. Variants follow their source.
    pub fn is_enabled(&self) -> bool {
        match &self.variant {
            Some(variant) => variant.source.is_enabled(),
            None => self.enabled.load(Ordering::Acquire),
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether this is a swapped-argument variant of another command.
    pub fn is_variant(&self) -> bool {
        self.variant.is_some()
    }

    /// The declared command: `self` unless this is a variant.
    pub fn source(&self) -> &Command {
        match &self.variant {
            Some(variant) => &variant.source,
            None => self,
        }
    }

    pub(crate) fn source_arc(self: &Arc<Self>) -> Arc<Command> {
        match &self.variant {
            Some(variant) => Arc::clone(&variant.source),
            None => Arc::clone(self),
        }
    }

    /// Reorder values bound in this command's parameter order back into
    /// declaration order.
    pub(crate) fn restore_order(&self, values: Vec<Value>) -> Vec<Value> {
        match &self.variant {
            Some(variant) => variant.swapper.backward(&values),
            None => values,
        }
    }

    /// Build the variant of `source` whose parameters are permuted by `swapper`.
    pub(crate) fn swap_variant(source: &Arc<Command>, swapper: Arc<Swapper>, penalty: i32) -> Self {
        let transpositions = i32::try_from(swapper.transpositions().len()).unwrap_or(i32::MAX);
        Self {
            id: CommandId::next(),
            name_paths: source.name_paths.clone(),
            description: source.description.clone(),
            priority: source
                .priority
                .saturating_sub(penalty.saturating_mul(transpositions)),
            context: source.context.clone(),
            parameters: swapper.forward(&source.parameters),
            preconditions: source.preconditions.clone(),
            swappable: Vec::new(),
            enabled: AtomicBool::new(true),
            variant: Some(SwapVariant {
                source: Arc::clone(source),
                swapper,
            }),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("name_paths", &self.name_paths)
            .field("priority", &self.priority)
            .field("context", &self.context)
            .field("parameters", &self.parameters)
            .field("preconditions", &self.preconditions.len())
            .field("swappable", &self.swappable)
            .field("enabled", &self.is_enabled())
            .field("variant_of", &self.variant.as_ref().map(|v| v.source.id))
            .finish()
    }
}

/// Builder for [`Command`].
pub struct CommandBuilder {
    name_paths: Vec<NamePath>,
    description: Option<String>,
    priority: i32,
    context: ContextConstraint,
    parameters: Vec<Parameter>,
    preconditions: Vec<Arc<dyn Precondition>>,
    swappable: Vec<usize>,
    enabled: bool,
}

impl CommandBuilder {
    /// Start a command reachable under `path`.
    pub fn new(path: impl Into<NamePath>) -> Self {
        Self {
            name_paths: vec![path.into()],
            description: None,
            priority: 0,
            context: ContextConstraint::Any,
            parameters: Vec::new(),
            preconditions: Vec::new(),
            swappable: Vec::new(),
            enabled: true,
        }
    }

    /// Add another path the command is reachable under.
    #[must_use]
    pub fn alias(mut self, path: impl Into<NamePath>) -> Self {
        self.name_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Higher priority wins when several commands match.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn context(mut self, context: ContextConstraint) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn precondition(mut self, precondition: Arc<dyn Precondition>) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Mark parameter positions whose arguments may be typed in any order.
    #[must_use]
    pub fn swappable(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.swappable.extend(indices);
        self
    }

    /// Start out disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Validate the definition and produce the command.
    pub fn build(self) -> Result<Command, RegistrationError> {
        let display = self
            .name_paths
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        let invalid = |reason: String| RegistrationError::InvalidCommand {
            command: display.clone(),
            reason,
        };

        if self.name_paths.iter().any(NamePath::is_empty) {
            return Err(invalid("name paths must have at least one segment".to_string()));
        }

        for (i, parameter) in self.parameters.iter().enumerate() {
            if parameter.length == Some(0) {
                return Err(invalid(format!(
                    "parameter `{}` consumes zero tokens",
                    parameter.name
                )));
            }
            if parameter.is_remainder() && i + 1 != self.parameters.len() {
                return Err(invalid(format!(
                    "remainder parameter `{}` must be the last parameter",
                    parameter.name
                )));
            }
            if self.parameters[..i].iter().any(|p| p.name == parameter.name) {
                return Err(invalid(format!(
                    "duplicate parameter name `{}`",
                    parameter.name
                )));
            }
        }

        let mut name_paths = self.name_paths;
        let mut seen = Vec::with_capacity(name_paths.len());
        name_paths.retain(|path| {
            if seen.contains(path) {
                false
            } else {
                seen.push(path.clone());
                true
            }
        });

        Ok(Command {
            id: CommandId::next(),
            name_paths,
            description: self.description,
            priority: self.priority,
            context: self.context,
            parameters: self.parameters,
            preconditions: self.preconditions,
            swappable: self.swappable,
            enabled: AtomicBool::new(self.enabled),
            variant: None,
        })
    }
}

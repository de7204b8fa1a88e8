//! Invocation context passed through a dispatch.

use std::collections::HashMap;

/// Where and by whom a command line was entered.
///
/// `kind` is matched against each command's [`ContextConstraint`]; the rest is
/// opaque to the engine and exists for preconditions, readers and handlers.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// Kind of context (e.g. `"guild"`, `"direct"`, `"console"`).
    pub kind: String,

    /// Identifier of whoever invoked the command.
    pub invoker: Option<String>,

    /// Free-form properties.
    pub properties: HashMap<String, String>,
}

impl CommandContext {
    /// Creates a context of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Builder: set the invoker.
    #[must_use]
    pub fn with_invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker = Some(invoker.into());
        self
    }

    /// Builder: add a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Which context kinds a command may run in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContextConstraint {
    /// Any context.
    #[default]
    Any,
    /// Only the listed kinds.
    Kinds(Vec<String>),
}

impl ContextConstraint {
    /// Constraint accepting only the given kinds.
    pub fn kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Kinds(kinds.into_iter().map(Into::into).collect())
    }

    /// Whether a context of `kind` satisfies the constraint.
    pub fn allows(&self, kind: &str) -> bool {
        match self {
            ContextConstraint::Any => true,
            ContextConstraint::Kinds(kinds) => kinds.iter().any(|k| k == kind),
        }
    }
}

//! Type readers: string-to-value conversion for parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Number, Value};

use crate::command::Parameter;
use crate::context::CommandContext;

/// Converts one raw token into a typed value.
///
/// The error string is surfaced to the caller as the conversion failure reason.
#[async_trait]
pub trait TypeReader: Send + Sync {
    async fn read(
        &self,
        input: &str,
        parameter: &Parameter,
        context: &CommandContext,
    ) -> Result<Value, String>;
}

/// Readers keyed by parameter type name.
#[derive(Clone)]
pub struct TypeReaderRegistry {
    readers: HashMap<String, Arc<dyn TypeReader>>,
}

impl fmt::Debug for TypeReaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.readers.keys().collect();
        names.sort();
        f.debug_struct("TypeReaderRegistry")
            .field("readers", &names)
            .finish()
    }
}

impl Default for TypeReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeReaderRegistry {
    /// Registry with the built-in `string`, `int`, `float` and `bool` readers.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("string", Arc::new(StringReader));
        registry.register("int", Arc::new(IntReader));
        registry.register("float", Arc::new(FloatReader));
        registry.register("bool", Arc::new(BoolReader));
        registry
    }

    /// Registry with no readers at all.
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Register or replace the reader for `type_name`.
    pub fn register(&mut self, type_name: impl Into<String>, reader: Arc<dyn TypeReader>) {
        self.readers.insert(type_name.into(), reader);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TypeReader>> {
        self.readers.get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.readers.contains_key(type_name)
    }
}

/// Passes the token through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringReader;

#[async_trait]
impl TypeReader for StringReader {
    async fn read(&self, input: &str, _: &Parameter, _: &CommandContext) -> Result<Value, String> {
        Ok(Value::String(input.to_string()))
    }
}

/// Signed 64-bit integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntReader;

#[async_trait]
impl TypeReader for IntReader {
    async fn read(&self, input: &str, _: &Parameter, _: &CommandContext) -> Result<Value, String> {
        input
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("`{input}` is not an integer: {e}"))
    }
}

/// Finite floating-point numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatReader;

#[async_trait]
impl TypeReader for FloatReader {
    async fn read(&self, input: &str, _: &Parameter, _: &CommandContext) -> Result<Value, String> {
        let parsed = input
            .parse::<f64>()
            .map_err(|e| format!("`{input}` is not a number: {e}"))?;
        Number::from_f64(parsed)
            .map(Value::Number)
            .ok_or_else(|| format!("`{input}` is not a finite number"))
    }
}

/// `true/false`, `yes/no`, `on/off`, `1/0`, case-insensitive.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolReader;

#[async_trait]
impl TypeReader for BoolReader {
    async fn read(&self, input: &str, _: &Parameter, _: &CommandContext) -> Result<Value, String> {
        match input.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(format!("`{input}` is not a boolean")),
        }
    }
}

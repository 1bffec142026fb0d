//! Typed input and output values
//!
//! Modules consume values through the [`Input`] handle whether the value was
//! a literal from the workflow document, a declared default, or piped from a
//! predecessor operation's outputs. Values are tagged at construction time;
//! accessors never coerce across kinds.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// Type token used for structured (array/object) values carried through the
/// engine as raw JSON.
pub const JSON_TOKEN: &str = "json";

/// A runtime value flowing between operations.
///
/// Scalars carry their detected kind. Anything that is not a scalar is
/// wrapped as an [`OpaqueValue`] with a type token, which downstream modules
/// downcast explicitly.
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Opaque(OpaqueValue),
}

impl Value {
    /// Detect a value from raw JSON.
    ///
    /// Numbers widen in order: signed 64-bit, then unsigned 64-bit, then
    /// float. Arrays and objects become opaque values under [`JSON_TOKEN`].
    /// `null` detects nothing and returns `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Some(Value::UInt(u))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            other => Some(Value::Opaque(OpaqueValue::new(JSON_TOKEN, other.clone()))),
        }
    }

    /// The declared type this value would satisfy exactly.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Float(_) => ValueType::Float,
            Value::Bool(_) => ValueType::Bool,
            Value::Opaque(o) => ValueType::Opaque(o.token()),
        }
    }

    /// Downcast an opaque value to a concrete type. Returns `None` for
    /// scalars and for opaque values of a different underlying type.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Value::Opaque(o) => o.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<OpaqueValue> for Value {
    fn from(v: OpaqueValue) -> Self {
        Value::Opaque(v)
    }
}

/// A shared, dynamically typed value identified by a type token.
///
/// Opaque values let modules hand rich resources (database clients, API
/// handles) to downstream operations. The token stands in for the concrete
/// type during validation; assignability is token equality.
#[derive(Clone)]
pub struct OpaqueValue {
    token: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl OpaqueValue {
    /// Wrap a value under the given type token.
    pub fn new<T: Any + Send + Sync>(token: &'static str, value: T) -> Self {
        Self {
            token,
            inner: Arc::new(value),
        }
    }

    /// The type token this value was registered under.
    pub fn token(&self) -> &'static str {
        self.token
    }

    /// Downcast to the concrete wrapped type.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Downcast to a shared handle of the concrete wrapped type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueValue")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// A declared value type in module metadata.
///
/// Declared types drive the pre-execution compatibility check: they are
/// compared by table lookup, never by inspecting runtime values beyond their
/// detected kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    UInt,
    Float,
    Bool,
    /// A named opaque type; values must carry the same token.
    Opaque(&'static str),
    /// An optional wrapper; an unwrapped value of the inner type is also
    /// assignable.
    Optional(Box<ValueType>),
}

impl ValueType {
    /// Whether a runtime value can be bound to this declared type.
    pub fn assignable_from(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Optional(inner), v) => inner.assignable_from(v),
            (ValueType::String, Value::String(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::UInt, Value::UInt(_)) => true,
            (ValueType::Float, Value::Float(_)) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Opaque(token), Value::Opaque(o)) => o.token() == *token,
            _ => false,
        }
    }

    /// Shorthand for an optional wrapper around this type.
    pub fn optional(self) -> ValueType {
        ValueType::Optional(Box::new(self))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Int => write!(f, "int"),
            ValueType::UInt => write!(f, "uint"),
            ValueType::Float => write!(f, "float"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Opaque(token) => write!(f, "opaque({})", token),
            ValueType::Optional(inner) => write!(f, "optional({})", inner),
        }
    }
}

/// A single operation input.
///
/// Inputs are either static values known when the workflow is loaded, or
/// references to the output of another operation which are resolved during
/// execution. Scalar accessors return the zero value of their kind when the
/// detected type differs; callers that need the original variant use
/// [`Input::auto`].
#[derive(Debug, Clone)]
pub struct Input(Repr);

#[derive(Debug, Clone)]
enum Repr {
    /// A static value. `None` models an optional input declared without a
    /// default: present in the context, but carrying nothing.
    Static(Option<Value>),
    Dependency { operation: String, output: String },
}

impl Input {
    /// Create an input from a static value, detecting its kind.
    pub fn from_value(value: impl Into<Value>) -> Self {
        Input(Repr::Static(Some(value.into())))
    }

    /// Create an empty static input.
    pub fn null() -> Self {
        Input(Repr::Static(None))
    }

    /// Create an input resolved at execution time from another operation's
    /// output.
    pub fn from_dependency(operation: impl Into<String>, output: impl Into<String>) -> Self {
        Input(Repr::Dependency {
            operation: operation.into(),
            output: output.into(),
        })
    }

    /// False when the value is only available at execution time.
    pub fn is_static(&self) -> bool {
        matches!(self.0, Repr::Static(_))
    }

    pub fn as_str(&self) -> &str {
        match self.value() {
            Some(Value::String(s)) => s,
            _ => "",
        }
    }

    pub fn as_bool(&self) -> bool {
        matches!(self.value(), Some(Value::Bool(true)))
    }

    pub fn as_int(&self) -> i64 {
        match self.value() {
            Some(Value::Int(i)) => *i,
            _ => 0,
        }
    }

    pub fn as_uint(&self) -> u64 {
        match self.value() {
            Some(Value::UInt(v)) => *v,
            _ => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self.value() {
            Some(Value::Float(v)) => *v,
            _ => 0.0,
        }
    }

    /// The underlying value regardless of kind, when one was detected.
    pub fn as_any(&self) -> Option<&Value> {
        self.value()
    }

    /// The value in its originally detected kind.
    ///
    /// Fails for dependency references and for empty inputs, where no type
    /// was ever detected.
    pub fn auto(&self) -> Result<Value> {
        match self.value() {
            Some(v) => Ok(v.clone()),
            None => Err(EngineError::UnknownInputType),
        }
    }

    /// Id of the operation providing this input, or empty when static.
    pub fn dependency_id(&self) -> &str {
        match &self.0 {
            Repr::Dependency { operation, .. } => operation,
            Repr::Static(_) => "",
        }
    }

    /// Output key on the dependency operation, or empty when static.
    pub fn output_key(&self) -> &str {
        match &self.0 {
            Repr::Dependency { output, .. } => output,
            Repr::Static(_) => "",
        }
    }

    pub(crate) fn value(&self) -> Option<&Value> {
        match &self.0 {
            Repr::Static(v) => v.as_ref(),
            Repr::Dependency { .. } => None,
        }
    }
}

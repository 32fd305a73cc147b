use crate::error::Error;
use crate::sequence::SequenceRef;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One step of a sequence's iteration: an ordered tuple of values.
pub type Element = Vec<Value>;

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int64,
    Float64,
    Str,
    Variant,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Str => "string",
            DType::Variant => "variant",
        };
        write!(f, "{}", name)
    }
}

/// A typed value flowing through a sequence pipeline.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Str(String),
    Variant(Variant),
    /// Non-scalar array of values.
    List(Vec<Value>),
}

impl Value {
    /// Encodes a sequence so it can be returned from a mapping function.
    pub fn sequence(sequence: SequenceRef) -> Self {
        Value::Variant(Variant::new(sequence))
    }

    /// Type of the value, or of its items for a list. `None` for an empty
    /// list.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Value::Bool(_) => Some(DType::Bool),
            Value::Int64(_) => Some(DType::Int64),
            Value::Float64(_) => Some(DType::Float64),
            Value::Str(_) => Some(DType::Str),
            Value::Variant(_) => Some(DType::Variant),
            Value::List(items) => items.first().and_then(Value::dtype),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&Variant> {
        match self {
            Value::Variant(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

/// Opaque, type-erased payload of a variant value.
#[derive(Clone)]
pub struct Variant {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Variant {
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Variant {
            payload: Arc::new(payload),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Decodes the payload as a sequence, returning a new reference to it.
    pub fn decode_sequence(&self) -> Result<SequenceRef, Error> {
        self.downcast_ref::<SequenceRef>()
            .map(Arc::clone)
            .ok_or_else(|| {
                Error::Decode(format!(
                    "variant holds a value of type `{}`, not a sequence",
                    self.type_name
                ))
            })
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variant")
            .field("type_name", &self.type_name)
            .finish()
    }
}

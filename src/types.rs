//! Value categories, type tags and chromosome signatures.

// Value coercions intentionally truncate and saturate
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive value category a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Truth value.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Opaque symbolic value.
    Object,
    /// No value; executed for side effects only.
    Void,
}

impl ValueType {
    /// Whether arithmetic operators can be instantiated for this category.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Float | Self::Double)
    }

    /// Stable lowercase name, also used in configuration files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Object => "object",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value category plus an optional auxiliary sub-type.
///
/// Sub-types let a vocabulary split one category into incompatible roles,
/// e.g. two kinds of integer that must never be swapped by crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeSpec {
    /// Value category.
    pub value: ValueType,
    /// Auxiliary sub-type, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<u32>,
}

impl TypeSpec {
    /// Type with no sub-type.
    #[must_use]
    pub const fn of(value: ValueType) -> Self {
        Self { value, sub: None }
    }

    /// Type restricted to a sub-type.
    #[must_use]
    pub const fn with_sub(value: ValueType, sub: u32) -> Self {
        Self {
            value,
            sub: Some(sub),
        }
    }

    /// Whether a node returning `provided` may fill a position requiring `self`.
    ///
    /// A requirement without a sub-type accepts any sub-type of its category.
    #[must_use]
    pub fn accepts(&self, provided: &TypeSpec) -> bool {
        self.value == provided.value && (self.sub.is_none() || self.sub == provided.sub)
    }
}

impl From<ValueType> for TypeSpec {
    fn from(value: ValueType) -> Self {
        Self::of(value)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}#{sub}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// A runtime value flowing through the interpreter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Truth value.
    Boolean(bool),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Symbolic value.
    Object(String),
    /// Result of a side-effect-only node.
    #[default]
    Void,
}

impl Value {
    /// Neutral value of a category (false, zero, empty, void).
    #[must_use]
    pub fn zero(ty: ValueType) -> Self {
        match ty {
            ValueType::Boolean => Self::Boolean(false),
            ValueType::Integer => Self::Integer(0),
            ValueType::Long => Self::Long(0),
            ValueType::Float => Self::Float(0.0),
            ValueType::Double => Self::Double(0.0),
            ValueType::Object => Self::Object(String::new()),
            ValueType::Void => Self::Void,
        }
    }

    /// Build a value of `ty` from a double, truncating for integer categories.
    #[must_use]
    pub fn from_f64(ty: ValueType, x: f64) -> Self {
        Self::Double(x).coerce(ty)
    }

    /// Category of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Boolean(_) => ValueType::Boolean,
            Self::Integer(_) => ValueType::Integer,
            Self::Long(_) => ValueType::Long,
            Self::Float(_) => ValueType::Float,
            Self::Double(_) => ValueType::Double,
            Self::Object(_) => ValueType::Object,
            Self::Void => ValueType::Void,
        }
    }

    /// Truth view. Numbers are true when non-zero.
    #[must_use]
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Integer(v) => *v != 0,
            Self::Long(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::Double(v) => *v != 0.0,
            Self::Object(s) => !s.is_empty(),
            Self::Void => false,
        }
    }

    /// Integer view. Floats saturate, NaN becomes zero.
    #[must_use]
    pub fn to_i32(&self) -> i32 {
        match self {
            Self::Boolean(b) => i32::from(*b),
            Self::Integer(v) => *v,
            Self::Long(v) => (*v).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
            Self::Float(v) => *v as i32,
            Self::Double(v) => *v as i32,
            Self::Object(_) | Self::Void => 0,
        }
    }

    /// Long view.
    #[must_use]
    pub fn to_i64(&self) -> i64 {
        match self {
            Self::Boolean(b) => i64::from(*b),
            Self::Integer(v) => i64::from(*v),
            Self::Long(v) => *v,
            Self::Float(v) => *v as i64,
            Self::Double(v) => *v as i64,
            Self::Object(_) | Self::Void => 0,
        }
    }

    /// Float view.
    #[must_use]
    pub fn to_f32(&self) -> f32 {
        self.to_f64() as f32
    }

    /// Double view.
    #[must_use]
    pub fn to_f64(&self) -> f64 {
        match self {
            Self::Boolean(b) => f64::from(u8::from(*b)),
            Self::Integer(v) => f64::from(*v),
            Self::Long(v) => *v as f64,
            Self::Float(v) => f64::from(*v),
            Self::Double(v) => *v,
            Self::Object(_) | Self::Void => 0.0,
        }
    }

    /// Convert to another category. Total: every pair of categories converts.
    #[must_use]
    pub fn coerce(self, ty: ValueType) -> Self {
        if self.value_type() == ty {
            return self;
        }
        match ty {
            ValueType::Boolean => Self::Boolean(self.to_bool()),
            ValueType::Integer => Self::Integer(self.to_i32()),
            ValueType::Long => Self::Long(self.to_i64()),
            ValueType::Float => Self::Float(self.to_f32()),
            ValueType::Double => Self::Double(self.to_f64()),
            ValueType::Object => Self::Object(self.to_string()),
            ValueType::Void => Self::Void,
        }
    }
}

macro_rules! impl_value_from {
    ($($t:ty => $variant:ident),*) => {$(
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::$variant(v)
            }
        }
    )*};
}

impl_value_from!(bool => Boolean, i32 => Integer, i64 => Long, f32 => Float, f64 => Double, String => Object);

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v:?}f"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Object(s) => write!(f, "{s:?}"),
            Self::Void => f.write_str("void"),
        }
    }
}

/// Declared shape of one chromosome slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Type the root node must return.
    pub return_type: TypeSpec,
    /// Argument types; non-empty only for ADF chromosomes.
    #[serde(default)]
    pub arg_types: Vec<TypeSpec>,
    /// Minimum tree depth (a lone terminal has depth 1).
    pub min_depth: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
}

impl Signature {
    /// Signature of a result-producing chromosome.
    #[must_use]
    pub fn new(return_type: impl Into<TypeSpec>, min_depth: usize, max_depth: usize) -> Self {
        Self {
            return_type: return_type.into(),
            arg_types: Vec::new(),
            min_depth,
            max_depth,
        }
    }

    /// Add ADF argument types.
    #[must_use]
    pub fn with_args(mut self, arg_types: Vec<TypeSpec>) -> Self {
        self.arg_types = arg_types;
        self
    }

    /// Whether `depth` lies within the signature's bounds.
    #[must_use]
    pub fn depth_in_bounds(&self, depth: usize) -> bool {
        depth >= self.min_depth && depth <= self.max_depth
    }
}

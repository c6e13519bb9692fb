//! Node vocabulary: the primitives program trees are built from.
//!
//! Every node kind is a variant of the closed [`NodeKind`] enum. User
//! operations plug in through [`Primitive`], a named closure registered with
//! the vocabulary, instead of subclassing.
//!
//! Nodes declare their return type and the type each child position
//! requires. The builder and the genetic operators only ever place a node
//! where the position's required type accepts the node's return type.

mod registry;

pub use registry::{NodeFactory, NodeParams, NodeRegistry, NodeSpec};

use crate::error::EvalResult;
use crate::program::RunContext;
use crate::types::{TypeSpec, Value, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Signature of a registered primitive's evaluation routine.
pub type PrimitiveFn = dyn Fn(&[Value], &mut RunContext) -> EvalResult<Value> + Send + Sync;

/// Built-in operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Addition (integers wrap).
    Add,
    /// Subtraction (integers wrap).
    Sub,
    /// Multiplication (integers wrap).
    Mul,
    /// Protected division: a zero divisor yields zero.
    Div,
    /// Protected remainder: a zero divisor yields zero.
    Mod,
    /// Negation.
    Neg,
    /// Absolute value.
    Abs,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Equality.
    Eq,
    /// Logical AND.
    And,
    /// Logical OR.
    Or,
    /// Logical XOR.
    Xor,
    /// Logical NOT.
    Not,
}

impl Op {
    /// Number of operands.
    #[must_use]
    pub fn arity(self) -> usize {
        match self {
            Self::Neg | Self::Abs | Self::Not => 1,
            _ => 2,
        }
    }

    /// Whether the operator compares numbers and returns a boolean.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Gt | Self::Lt | Self::Eq)
    }

    /// Whether the operator works on booleans only.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor | Self::Not)
    }

    /// Symbol used in s-expressions.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Neg => "neg",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Not => "not",
        }
    }

    /// Type-compatible substitute used by point mutation.
    ///
    /// The partner has the same arity, operand types and return type.
    #[must_use]
    pub fn partner(self) -> Option<Self> {
        match self {
            Self::Add => Some(Self::Sub),
            Self::Sub => Some(Self::Add),
            Self::Mul => Some(Self::Div),
            Self::Div => Some(Self::Mul),
            Self::Gt => Some(Self::Lt),
            Self::Lt => Some(Self::Gt),
            Self::And => Some(Self::Or),
            Self::Or => Some(Self::And),
            Self::Min => Some(Self::Max),
            Self::Max => Some(Self::Min),
            Self::Neg | Self::Abs | Self::Mod | Self::Eq | Self::Xor | Self::Not => None,
        }
    }
}

/// Bounds for an ephemeral random constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstRange {
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl ConstRange {
    /// Whether `x` lies within the bounds.
    #[must_use]
    pub fn contains(&self, x: f64) -> bool {
        x >= self.min && x <= self.max
    }

    /// Width of the range.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// A user-supplied operation registered with the vocabulary.
#[derive(Clone)]
pub struct Primitive {
    name: String,
    func: Arc<PrimitiveFn>,
}

impl Primitive {
    /// Wrap a closure as a named primitive.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value], &mut RunContext) -> EvalResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Name shown in s-expressions.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the primitive on already-evaluated arguments.
    ///
    /// # Errors
    ///
    /// Propagates whatever fault the primitive raises.
    pub fn call(&self, args: &[Value], ctx: &mut RunContext) -> EvalResult<Value> {
        (self.func)(args, ctx)
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Primitive")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// What a node does.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal value. With a range it is an ephemeral random constant: each
    /// placement draws a fresh value and mutation nudges it within bounds.
    Constant {
        /// Current value.
        value: Value,
        /// Bounds for random draws and nudges.
        range: Option<ConstRange>,
    },
    /// Reads a named binding from the run environment.
    Variable(String),
    /// Built-in operator.
    Op(Op),
    /// Registered user operation.
    Primitive(Primitive),
    /// Calls the ADF held in chromosome `target`.
    AdfCall(usize),
    /// Reads argument `index` of the innermost ADF call.
    AdfArg(usize),
    /// Evaluates its child and stores the value in a memory cell.
    Store(String),
    /// Reads a memory cell.
    Read(String),
    /// Evaluates the test, then exactly one of two branches.
    If,
    /// Repeats its body `min(count, cap)` times.
    Loop {
        /// Variable holding the repeat count.
        count: String,
        /// Variable set to the iteration number before each pass.
        index: Option<String>,
        /// Upper bound on repetitions.
        cap: u32,
    },
    /// Evaluates every child in order and returns the last value.
    Sequence,
}

/// One primitive operation or value in a program tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    return_type: TypeSpec,
    child_types: Vec<TypeSpec>,
}

impl Node {
    /// Fully specified node.
    #[must_use]
    pub fn new(kind: NodeKind, return_type: TypeSpec, child_types: Vec<TypeSpec>) -> Self {
        Self {
            kind,
            return_type,
            child_types,
        }
    }

    /// Fixed literal.
    #[must_use]
    pub fn constant(value: Value) -> Self {
        let ty = TypeSpec::of(value.value_type());
        Self::new(NodeKind::Constant { value, range: None }, ty, Vec::new())
    }

    /// Ephemeral random constant of a numeric category drawn from `[min, max]`.
    #[must_use]
    pub fn ephemeral(ty: ValueType, min: f64, max: f64) -> Self {
        let range = ConstRange { min, max };
        Self::new(
            NodeKind::Constant {
                value: Value::from_f64(ty, min),
                range: Some(range),
            },
            TypeSpec::of(ty),
            Vec::new(),
        )
    }

    /// Variable reference.
    #[must_use]
    pub fn variable(name: impl Into<String>, ty: impl Into<TypeSpec>) -> Self {
        Self::new(NodeKind::Variable(name.into()), ty.into(), Vec::new())
    }

    /// Built-in operator instantiated for operand category `ty`.
    ///
    /// Arithmetic returns `ty`; comparisons take `ty` operands and return a
    /// boolean; logical operators ignore `ty` and work on booleans.
    #[must_use]
    pub fn op(op: Op, ty: impl Into<TypeSpec>) -> Self {
        let ty = ty.into();
        let boolean = TypeSpec::of(ValueType::Boolean);
        let (ret, operand) = if op.is_logical() {
            (boolean, boolean)
        } else if op.is_comparison() {
            (boolean, ty)
        } else {
            (ty, ty)
        };
        Self::new(NodeKind::Op(op), ret, vec![operand; op.arity()])
    }

    /// Registered primitive with explicit types.
    #[must_use]
    pub fn primitive(primitive: Primitive, return_type: impl Into<TypeSpec>, args: Vec<TypeSpec>) -> Self {
        Self::new(NodeKind::Primitive(primitive), return_type.into(), args)
    }

    /// Call of the ADF in chromosome `target`.
    #[must_use]
    pub fn adf_call(target: usize, return_type: impl Into<TypeSpec>, args: Vec<TypeSpec>) -> Self {
        Self::new(NodeKind::AdfCall(target), return_type.into(), args)
    }

    /// ADF argument terminal.
    #[must_use]
    pub fn adf_arg(index: usize, ty: impl Into<TypeSpec>) -> Self {
        Self::new(NodeKind::AdfArg(index), ty.into(), Vec::new())
    }

    /// Memory store of a `ty` value; returns the stored value.
    #[must_use]
    pub fn store(cell: impl Into<String>, ty: impl Into<TypeSpec>) -> Self {
        let ty = ty.into();
        Self::new(NodeKind::Store(cell.into()), ty, vec![ty])
    }

    /// Memory read.
    #[must_use]
    pub fn read(cell: impl Into<String>, ty: impl Into<TypeSpec>) -> Self {
        Self::new(NodeKind::Read(cell.into()), ty.into(), Vec::new())
    }

    /// Conditional returning `ty`.
    #[must_use]
    pub fn if_else(ty: impl Into<TypeSpec>) -> Self {
        let ty = ty.into();
        Self::new(
            NodeKind::If,
            ty,
            vec![TypeSpec::of(ValueType::Boolean), ty, ty],
        )
    }

    /// Bounded loop over a `ty` body.
    #[must_use]
    pub fn repeat(
        count: impl Into<String>,
        index: Option<String>,
        cap: u32,
        ty: impl Into<TypeSpec>,
    ) -> Self {
        let ty = ty.into();
        Self::new(
            NodeKind::Loop {
                count: count.into(),
                index,
                cap,
            },
            ty,
            vec![ty],
        )
    }

    /// Sequence of sub-programs; returns the last child's type.
    ///
    /// Returns `None` for an empty child list.
    #[must_use]
    pub fn sequence(child_types: Vec<TypeSpec>) -> Option<Self> {
        let ret = *child_types.last()?;
        Some(Self::new(NodeKind::Sequence, ret, child_types))
    }

    /// What the node does.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Declared return type.
    #[must_use]
    pub fn return_type(&self) -> TypeSpec {
        self.return_type
    }

    /// Required type of each child position.
    #[must_use]
    pub fn child_types(&self) -> &[TypeSpec] {
        &self.child_types
    }

    /// Required type of child `index`.
    #[must_use]
    pub fn required_child_type(&self, index: usize) -> Option<TypeSpec> {
        self.child_types.get(index).copied()
    }

    /// Number of children.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.child_types.len()
    }

    /// Whether the node ends a branch.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.child_types.is_empty()
    }

    /// Literal value, for constants.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            NodeKind::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Replace a constant's value in place. Other kinds are left untouched.
    ///
    /// The value is coerced to the declared return type so the node's type
    /// never changes.
    pub fn set_value(&mut self, new_value: Value) {
        let ty = self.return_type.value;
        if let NodeKind::Constant { value, .. } = &mut self.kind {
            *value = new_value.coerce(ty);
        }
    }

    /// Copy of this node with a different kind but identical types.
    #[must_use]
    pub fn with_kind(&self, kind: NodeKind) -> Self {
        Self {
            kind,
            return_type: self.return_type,
            child_types: self.child_types.clone(),
        }
    }

    /// Whether `other` has the same return and child types.
    #[must_use]
    pub fn same_shape(&self, other: &Node) -> bool {
        self.return_type == other.return_type && self.child_types == other.child_types
    }

    /// Label used in s-expressions and element views.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Constant { value, .. } => value.to_string(),
            NodeKind::Variable(name) => name.clone(),
            NodeKind::Op(op) => op.symbol().to_string(),
            NodeKind::Primitive(p) => p.name().to_string(),
            NodeKind::AdfCall(target) => format!("adf{target}"),
            NodeKind::AdfArg(index) => format!("arg{index}"),
            NodeKind::Store(cell) => format!("store[{cell}]"),
            NodeKind::Read(cell) => format!("read[{cell}]"),
            NodeKind::If => "if".to_string(),
            NodeKind::Loop {
                count,
                index: Some(index),
                cap,
            } => format!("loop[{count}<={cap};{index}]"),
            NodeKind::Loop { count, cap, .. } => format!("loop[{count}<={cap}]"),
            NodeKind::Sequence => "seq".to_string(),
        }
    }

    /// Canonical token for structural keys: the label plus the node's
    /// return type and, for functions, the required child types.
    ///
    /// ERC ranges only steer mutation and are left out.
    #[must_use]
    pub fn structural_token(&self) -> String {
        let mut token = format!("{}:{}", self.label(), self.return_type);
        if !self.child_types.is_empty() {
            let children: Vec<String> = self.child_types.iter().map(ToString::to_string).collect();
            token.push('(');
            token.push_str(&children.join(","));
            token.push(')');
        }
        token
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_node_types() {
        let add = Node::op(Op::Add, ValueType::Integer);
        assert_eq!(add.return_type(), TypeSpec::of(ValueType::Integer));
        assert_eq!(add.arity(), 2);

        let gt = Node::op(Op::Gt, ValueType::Double);
        assert_eq!(gt.return_type(), TypeSpec::of(ValueType::Boolean));
        assert_eq!(gt.required_child_type(0), Some(TypeSpec::of(ValueType::Double)));

        let not = Node::op(Op::Not, ValueType::Double);
        assert_eq!(not.child_types(), &[TypeSpec::of(ValueType::Boolean)]);
    }

    #[test]
    fn test_partners_keep_shape() {
        for op in [Op::Add, Op::Mul, Op::Gt, Op::And, Op::Min] {
            let node = Node::op(op, ValueType::Double);
            let partner = op.partner().map(|p| Node::op(p, ValueType::Double));
            assert!(partner.is_some_and(|p| p.same_shape(&node)));
        }
        assert!(Op::Mod.partner().is_none());
    }

    #[test]
    fn test_set_value_keeps_type() {
        let mut node = Node::ephemeral(ValueType::Integer, -5.0, 5.0);
        node.set_value(Value::Double(3.7));
        assert_eq!(node.value(), Some(&Value::Integer(3)));

        let mut var = Node::variable("x", ValueType::Double);
        var.set_value(Value::Double(1.0));
        assert_eq!(var.value(), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(Node::constant(Value::Integer(4)).label(), "4");
        assert_eq!(Node::op(Op::Mul, ValueType::Long).label(), "*");
        assert_eq!(Node::adf_call(1, ValueType::Double, Vec::new()).label(), "adf1");
        assert_eq!(
            Node::repeat("n", None, 8, ValueType::Void).label(),
            "loop[n<=8]"
        );
        assert_eq!(
            Node::repeat("n", Some("i".to_string()), 8, ValueType::Integer).label(),
            "loop[n<=8;i]"
        );
        assert!(Node::sequence(Vec::new()).is_none());
    }

    #[test]
    fn test_structural_token_carries_types() {
        assert_eq!(Node::variable("x", ValueType::Double).structural_token(), "x:double");
        assert_eq!(
            Node::op(Op::Gt, ValueType::Integer).structural_token(),
            ">:boolean(integer,integer)"
        );
        assert_ne!(
            Node::op(Op::Add, ValueType::Integer).structural_token(),
            Node::op(Op::Add, ValueType::Double).structural_token()
        );
        assert_ne!(
            Node::store("acc", TypeSpec::with_sub(ValueType::Integer, 1)).structural_token(),
            Node::store("acc", ValueType::Integer).structural_token()
        );
        assert_ne!(
            Node::repeat("n", Some("i".to_string()), 4, ValueType::Integer).structural_token(),
            Node::repeat("n", None, 4, ValueType::Integer).structural_token()
        );
    }
}

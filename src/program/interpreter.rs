//! Recursive evaluator over the flat node array.
//!
//! Plain operators evaluate their children first. Control nodes (`If`,
//! `Loop`, `Sequence`) receive child span offsets and decide themselves
//! which spans run and how often. Every node visit costs one step of the
//! context's budget, so runaway programs end in a fault instead of hanging.

// Loop counters are clamped to u32 caps before narrowing
#![allow(clippy::cast_possible_truncation)]

use super::{Program, RunContext};
use crate::error::{EvalFault, EvalResult};
use crate::node::{Node, NodeKind, Op};
use crate::types::{Value, ValueType};

/// Evaluate the subtree rooted at `pos` of chromosome `chromosome`.
///
/// `programs` holds every chromosome of the individual so ADF calls can
/// reach their targets.
pub(crate) fn eval(
    programs: &[Program],
    chromosome: usize,
    pos: usize,
    ctx: &mut RunContext,
) -> EvalResult<Value> {
    let program = programs
        .get(chromosome)
        .ok_or_else(|| EvalFault::Domain(format!("no chromosome {chromosome}")))?;
    let node = program
        .node(pos)
        .ok_or_else(|| EvalFault::Domain(format!("no node at {pos} in chromosome {chromosome}")))?;

    ctx.consume(1)?;
    ctx.enter()?;
    let result = eval_node(programs, chromosome, pos, node, ctx);
    ctx.leave();

    result.map(|v| v.coerce(node.return_type().value))
}

fn eval_node(
    programs: &[Program],
    chromosome: usize,
    pos: usize,
    node: &Node,
    ctx: &mut RunContext,
) -> EvalResult<Value> {
    let program = &programs[chromosome];
    let ret = node.return_type().value;

    match node.kind() {
        NodeKind::Constant { value, .. } => Ok(value.clone()),
        NodeKind::Variable(name) => Ok(ctx.env.get(name).cloned().unwrap_or_else(|| Value::zero(ret))),
        NodeKind::Read(cell) => Ok(ctx.memory.get(cell).cloned().unwrap_or_else(|| Value::zero(ret))),
        NodeKind::AdfArg(index) => ctx.arg(*index),
        NodeKind::Op(op) => {
            let args = eval_children(programs, chromosome, pos, node.arity(), ctx)?;
            let operand = node
                .required_child_type(0)
                .map_or(ret, |t| t.value);
            Ok(apply_op(*op, operand, &args))
        }
        NodeKind::Primitive(primitive) => {
            let args = eval_children(programs, chromosome, pos, node.arity(), ctx)?;
            primitive.call(&args, ctx)
        }
        NodeKind::AdfCall(target) => {
            let args = eval_children(programs, chromosome, pos, node.arity(), ctx)?;
            ctx.push_frame(args);
            let result = eval(programs, *target, 0, ctx);
            ctx.pop_frame();
            result
        }
        NodeKind::Store(cell) => {
            let value = eval(programs, chromosome, pos + 1, ctx)?;
            ctx.memory.set(cell, value.clone());
            Ok(value)
        }
        NodeKind::If => {
            let test = pos + 1;
            let then_branch = program.span_end(test);
            let else_branch = program.span_end(then_branch);
            if eval(programs, chromosome, test, ctx)?.to_bool() {
                eval(programs, chromosome, then_branch, ctx)
            } else {
                eval(programs, chromosome, else_branch, ctx)
            }
        }
        NodeKind::Loop { count, index, cap } => {
            let repeats = ctx
                .env
                .get(count)
                .map_or(0, Value::to_i64)
                .clamp(0, i64::from(*cap));
            let Some(index) = index else {
                let mut last = Value::zero(ret);
                for _ in 0..repeats {
                    last = eval(programs, chromosome, pos + 1, ctx)?;
                }
                return Ok(last);
            };

            // The index is scoped to the body; the outer binding comes back
            // on exit, faults included.
            let outer = ctx.env.get(index).cloned();
            let mut result = Ok(Value::zero(ret));
            for i in 0..repeats {
                ctx.env.bind(index.as_str(), Value::Integer(i as i32));
                result = eval(programs, chromosome, pos + 1, ctx);
                if result.is_err() {
                    break;
                }
            }
            match outer {
                Some(value) => ctx.env.bind(index.as_str(), value),
                None => {
                    ctx.env.unbind(index);
                }
            }
            result
        }
        NodeKind::Sequence => {
            let mut last = Value::zero(ret);
            let mut child = pos + 1;
            for _ in 0..node.arity() {
                last = eval(programs, chromosome, child, ctx)?;
                child = program.span_end(child);
            }
            Ok(last)
        }
    }
}

fn eval_children(
    programs: &[Program],
    chromosome: usize,
    pos: usize,
    arity: usize,
    ctx: &mut RunContext,
) -> EvalResult<Vec<Value>> {
    let program = &programs[chromosome];
    let mut args = Vec::with_capacity(arity);
    let mut child = pos + 1;
    for _ in 0..arity {
        args.push(eval(programs, chromosome, child, ctx)?);
        child = program.span_end(child);
    }
    Ok(args)
}

/// Apply a built-in operator to evaluated operands of category `operand`.
fn apply_op(op: Op, operand: ValueType, args: &[Value]) -> Value {
    let a = args.first().cloned().unwrap_or_default();
    let b = args.get(1).cloned().unwrap_or_default();

    if op.is_logical() {
        let (x, y) = (a.to_bool(), b.to_bool());
        return Value::Boolean(match op {
            Op::And => x && y,
            Op::Or => x || y,
            Op::Xor => x ^ y,
            _ => !x,
        });
    }

    match operand {
        ValueType::Integer => numeric_op(op, a.to_i32(), b.to_i32()),
        ValueType::Long => numeric_op(op, a.to_i64(), b.to_i64()),
        ValueType::Float => numeric_op(op, a.to_f32(), b.to_f32()),
        _ => numeric_op(op, a.to_f64(), b.to_f64()),
    }
}

/// Arithmetic that never panics: integers wrap, division is protected.
trait Numeric: Copy + PartialOrd + Into<Value> {
    fn plus(self, other: Self) -> Self;
    fn minus(self, other: Self) -> Self;
    fn times(self, other: Self) -> Self;
    fn divide(self, other: Self) -> Self;
    fn remainder(self, other: Self) -> Self;
    fn negate(self) -> Self;
    fn absolute(self) -> Self;
}

macro_rules! impl_numeric_int {
    ($($t:ty),*) => {$(
        impl Numeric for $t {
            fn plus(self, other: Self) -> Self { self.wrapping_add(other) }
            fn minus(self, other: Self) -> Self { self.wrapping_sub(other) }
            fn times(self, other: Self) -> Self { self.wrapping_mul(other) }
            fn divide(self, other: Self) -> Self {
                if other == 0 { 0 } else { self.wrapping_div(other) }
            }
            fn remainder(self, other: Self) -> Self {
                if other == 0 { 0 } else { self.wrapping_rem(other) }
            }
            fn negate(self) -> Self { self.wrapping_neg() }
            fn absolute(self) -> Self { self.wrapping_abs() }
        }
    )*};
}

macro_rules! impl_numeric_float {
    ($($t:ty),*) => {$(
        impl Numeric for $t {
            fn plus(self, other: Self) -> Self { self + other }
            fn minus(self, other: Self) -> Self { self - other }
            fn times(self, other: Self) -> Self { self * other }
            fn divide(self, other: Self) -> Self {
                if other == 0.0 { 0.0 } else { self / other }
            }
            fn remainder(self, other: Self) -> Self {
                if other == 0.0 { 0.0 } else { self % other }
            }
            fn negate(self) -> Self { -self }
            fn absolute(self) -> Self { self.abs() }
        }
    )*};
}

impl_numeric_int!(i32, i64);
impl_numeric_float!(f32, f64);

fn numeric_op<T: Numeric>(op: Op, a: T, b: T) -> Value {
    match op {
        Op::Add => a.plus(b).into(),
        Op::Sub => a.minus(b).into(),
        Op::Mul => a.times(b).into(),
        Op::Div => a.divide(b).into(),
        Op::Mod => a.remainder(b).into(),
        Op::Neg => a.negate().into(),
        Op::Abs => a.absolute().into(),
        Op::Min => (if b < a { b } else { a }).into(),
        Op::Max => (if b > a { b } else { a }).into(),
        Op::Gt => Value::Boolean(a > b),
        Op::Lt => Value::Boolean(a < b),
        Op::Eq => Value::Boolean(a.partial_cmp(&b) == Some(std::cmp::Ordering::Equal)),
        Op::And | Op::Or | Op::Xor | Op::Not => Value::Boolean(false),
    }
}

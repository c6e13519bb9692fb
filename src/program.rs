//! Program chromosomes: one typed tree stored as a flat prefix-order array.
//!
//! A node's children are the next `arity` subtree spans after it. There are
//! no pointers; span boundaries are computed on demand by scanning arities.
//!
//! ```text
//! (+ x (* 2 y))   →   [ +, x, *, 2, y ]
//!                       0  1  2  3  4
//! span_end(0) = 5, span_end(1) = 2, span_end(2) = 5
//! ```

mod context;
mod interpreter;

pub use context::{DEFAULT_STEP_BUDGET, Environment, Memory, RunContext};

use crate::error::EvalResult;
use crate::node::{Node, NodeKind};
use crate::types::{TypeSpec, Value};
use std::fmt;

/// One tree-shaped program in prefix layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    nodes: Vec<Node>,
}

impl Program {
    /// Wrap a prefix-ordered node array.
    #[must_use]
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// All nodes in prefix order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node at `pos`.
    #[must_use]
    pub fn node(&self, pos: usize) -> Option<&Node> {
        self.nodes.get(pos)
    }

    pub(crate) fn node_mut(&mut self, pos: usize) -> Option<&mut Node> {
        self.nodes.get_mut(pos)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the program has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> Option<&Node> {
        self.nodes.first()
    }

    /// One past the last node of the subtree rooted at `pos`.
    #[must_use]
    pub fn span_end(&self, pos: usize) -> usize {
        let mut pending = 1usize;
        let mut i = pos;
        while pending > 0 && i < self.nodes.len() {
            pending = pending - 1 + self.nodes[i].arity();
            i += 1;
        }
        i
    }

    /// Nodes of the subtree rooted at `pos`.
    #[must_use]
    pub fn subtree(&self, pos: usize) -> &[Node] {
        if pos >= self.nodes.len() {
            return &[];
        }
        &self.nodes[pos..self.span_end(pos)]
    }

    /// Positions of the direct children of `pos`.
    #[must_use]
    pub fn children(&self, pos: usize) -> Vec<usize> {
        let Some(node) = self.nodes.get(pos) else {
            return Vec::new();
        };
        let mut children = Vec::with_capacity(node.arity());
        let mut child = pos + 1;
        for _ in 0..node.arity() {
            if child >= self.nodes.len() {
                break;
            }
            children.push(child);
            child = self.span_end(child);
        }
        children
    }

    /// Tree level of every node; the root is level 1.
    #[must_use]
    pub fn levels(&self) -> Vec<usize> {
        let mut levels = Vec::with_capacity(self.nodes.len());
        let mut open: Vec<usize> = Vec::new();
        for node in &self.nodes {
            levels.push(open.len() + 1);
            if node.arity() > 0 {
                open.push(node.arity());
            } else {
                while let Some(remaining) = open.last_mut() {
                    *remaining -= 1;
                    if *remaining == 0 {
                        open.pop();
                    } else {
                        break;
                    }
                }
            }
        }
        levels
    }

    /// Number of levels in the tree (0 for an empty program).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels().into_iter().max().unwrap_or(0)
    }

    /// Parent position and child index of every node (`None` for the root).
    #[must_use]
    pub fn parents(&self) -> Vec<Option<(usize, usize)>> {
        let mut parents = vec![None; self.nodes.len()];
        let mut open: Vec<(usize, usize)> = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some((parent, seen)) = open.last_mut() {
                parents[i] = Some((*parent, *seen));
                *seen += 1;
            }
            if node.arity() > 0 {
                open.push((i, 0));
            } else {
                while let Some(&(parent, seen)) = open.last() {
                    if seen == self.nodes[parent].arity() {
                        open.pop();
                    } else {
                        break;
                    }
                }
            }
        }
        parents
    }

    /// Type the position `pos` must satisfy; `root` is the signature's
    /// return type.
    #[must_use]
    pub fn required_type_at(&self, pos: usize, root: TypeSpec) -> TypeSpec {
        match self.parents().get(pos).copied().flatten() {
            Some((parent, index)) => self.nodes[parent]
                .required_child_type(index)
                .unwrap_or(root),
            None => root,
        }
    }

    /// First position in `start..end` whose node satisfies `pred`.
    pub fn find_first<P>(&self, start: usize, end: usize, mut pred: P) -> Option<usize>
    where
        P: FnMut(&Node) -> bool,
    {
        let end = end.min(self.nodes.len());
        (start..end).find(|&i| pred(&self.nodes[i]))
    }

    /// Whether the array encodes exactly one complete tree.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let mut pending = 1usize;
        for node in &self.nodes {
            if pending == 0 {
                return false;
            }
            pending = pending - 1 + node.arity();
        }
        pending == 0
    }

    /// Whether the tree is complete and every node's return type satisfies
    /// the type its position requires.
    #[must_use]
    pub fn is_type_valid(&self, root: TypeSpec) -> bool {
        if !self.is_complete() {
            return false;
        }
        self.parents()
            .iter()
            .zip(&self.nodes)
            .all(|(parent, node)| {
                let required = match parent {
                    Some((p, k)) => self.nodes[*p].required_child_type(*k),
                    None => Some(root),
                };
                required.is_some_and(|r| r.accepts(&node.return_type()))
            })
    }

    /// Whether every loop that declares an index variable reads it somewhere
    /// in its body.
    #[must_use]
    pub fn loops_observe_index(&self) -> bool {
        self.nodes.iter().enumerate().all(|(i, node)| match node.kind() {
            NodeKind::Loop {
                index: Some(index), ..
            } => self
                .find_first(i + 1, self.span_end(i), |n| {
                    matches!(n.kind(), NodeKind::Variable(name) if name == index)
                })
                .is_some(),
            _ => true,
        })
    }

    /// Copy of this program with the subtree at `pos` replaced by `donor`.
    #[must_use]
    pub fn splice(&self, pos: usize, donor: &[Node]) -> Program {
        let end = self.span_end(pos);
        let mut nodes = Vec::with_capacity(self.nodes.len() - (end - pos) + donor.len());
        nodes.extend_from_slice(&self.nodes[..pos]);
        nodes.extend_from_slice(donor);
        nodes.extend_from_slice(&self.nodes[end..]);
        Program { nodes }
    }

    /// Canonical structural encoding: the s-expression over
    /// [`Node::structural_token`], so equal keys mean equal kinds, parameters
    /// and types at every position.
    #[must_use]
    pub fn structural_key(&self) -> String {
        let mut out = String::new();
        self.write_subtree(0, &mut out, &Node::structural_token);
        out
    }

    /// Evaluate as a standalone program (no ADFs reachable).
    ///
    /// # Errors
    ///
    /// Returns the fault raised during evaluation, e.g. budget exhaustion.
    pub fn execute(&self, ctx: &mut RunContext) -> EvalResult<Value> {
        execute_chromosome(std::slice::from_ref(self), 0, ctx)
    }

    /// Evaluate and read the result as a boolean.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_bool(&self, ctx: &mut RunContext) -> EvalResult<bool> {
        self.execute(ctx).map(|v| v.to_bool())
    }

    /// Evaluate and read the result as an integer.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_int(&self, ctx: &mut RunContext) -> EvalResult<i32> {
        self.execute(ctx).map(|v| v.to_i32())
    }

    /// Evaluate and read the result as a long.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_long(&self, ctx: &mut RunContext) -> EvalResult<i64> {
        self.execute(ctx).map(|v| v.to_i64())
    }

    /// Evaluate and read the result as a float.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_float(&self, ctx: &mut RunContext) -> EvalResult<f32> {
        self.execute(ctx).map(|v| v.to_f32())
    }

    /// Evaluate and read the result as a double.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_double(&self, ctx: &mut RunContext) -> EvalResult<f64> {
        self.execute(ctx).map(|v| v.to_f64())
    }

    /// Evaluate and read the result as an object.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_object(&self, ctx: &mut RunContext) -> EvalResult<String> {
        self.execute(ctx).map(|v| match v {
            Value::Object(s) => s,
            other => other.to_string(),
        })
    }

    /// Evaluate for side effects only.
    ///
    /// # Errors
    ///
    /// See [`Program::execute`].
    pub fn execute_void(&self, ctx: &mut RunContext) -> EvalResult<()> {
        self.execute(ctx).map(|_| ())
    }

    fn write_subtree(&self, pos: usize, out: &mut String, token: &dyn Fn(&Node) -> String) {
        let Some(node) = self.nodes.get(pos) else {
            return;
        };
        if node.is_terminal() {
            out.push_str(&token(node));
            return;
        }
        out.push('(');
        out.push_str(&token(node));
        for child in self.children(pos) {
            out.push(' ');
            self.write_subtree(child, out, token);
        }
        out.push(')');
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_subtree(0, &mut out, &Node::label);
        f.write_str(&out)
    }
}

/// Evaluate chromosome `index` of a multi-chromosome program.
pub(crate) fn execute_chromosome(
    programs: &[Program],
    index: usize,
    ctx: &mut RunContext,
) -> EvalResult<Value> {
    interpreter::eval(programs, index, 0, ctx)
}

//! Generic element tree over individuals and populations.
//!
//! An [`Element`] is a tag, string attributes and ordered children. It knows
//! nothing about any document format; an external serializer walks it (or
//! hands it to serde directly).

use crate::gp::{Genotype, Individual, Permutation};
use crate::node::{Node, NodeKind};
use crate::program::Program;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One node of the view tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Element name.
    pub tag: String,
    /// Attributes, ordered by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Ordered children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    /// Element with no attributes or children.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(key.into(), value.to_string());
        self
    }

    /// Append a child.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Append several children.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// Attribute value by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Number of elements in this subtree, including itself.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(Element::size).sum::<usize>()
    }

    /// Pre-order walk over the subtree.
    pub fn walk<F: FnMut(&Element, usize)>(&self, mut visit: F) {
        fn go<F: FnMut(&Element, usize)>(e: &Element, depth: usize, visit: &mut F) {
            visit(e, depth);
            for child in &e.children {
                go(child, depth + 1, visit);
            }
        }
        go(self, 0, &mut visit);
    }
}

impl fmt::Display for Element {
    /// Indented outline, one element per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut result = Ok(());
        self.walk(|e, depth| {
            if result.is_err() {
                return;
            }
            let attrs: Vec<String> = e.attributes.iter().map(|(k, v)| format!(" {k}={v:?}")).collect();
            result = writeln!(f, "{:indent$}{}{}", "", e.tag, attrs.concat(), indent = depth * 2);
        });
        result
    }
}

/// Conversion into the view tree.
pub trait ToElement {
    /// View of `self`.
    fn to_element(&self) -> Element;
}

impl ToElement for Program {
    fn to_element(&self) -> Element {
        fn node_at(program: &Program, pos: usize) -> Element {
            let mut element = program.node(pos).map_or_else(|| Element::new("node"), node_element);
            for child in program.children(pos) {
                element.children.push(node_at(program, child));
            }
            element
        }
        let root = if self.is_complete() {
            node_at(self, 0)
        } else {
            Element::new("invalid")
        };
        Element::new("program")
            .with_attribute("depth", self.depth())
            .with_attribute("size", self.len())
            .with_child(root)
    }
}

fn node_element(node: &Node) -> Element {
    let kind = match node.kind() {
        NodeKind::Constant { range: Some(_), .. } => "ephemeral",
        NodeKind::Constant { .. } => "constant",
        NodeKind::Variable(_) => "variable",
        NodeKind::Op(_) => "op",
        NodeKind::Primitive(_) => "primitive",
        NodeKind::AdfCall(_) => "adf-call",
        NodeKind::AdfArg(_) => "adf-arg",
        NodeKind::Store(_) => "store",
        NodeKind::Read(_) => "read",
        NodeKind::If => "if",
        NodeKind::Loop { .. } => "loop",
        NodeKind::Sequence => "sequence",
    };
    Element::new("node")
        .with_attribute("kind", kind)
        .with_attribute("label", node.label())
        .with_attribute("type", node.return_type())
}

impl ToElement for Individual {
    fn to_element(&self) -> Element {
        let mut element = fitness_element("individual", self.fitness());
        for (index, program) in self.chromosomes().iter().enumerate() {
            let mut chromosome = program.to_element();
            chromosome.tag = "chromosome".to_string();
            element.children.push(chromosome.with_attribute("index", index));
        }
        element
    }
}

impl<T> ToElement for Permutation<T>
where
    T: Clone + fmt::Debug + Send + Sync,
{
    fn to_element(&self) -> Element {
        let mut element = fitness_element("permutation", self.fitness());
        element.children = self
            .genes()
            .iter()
            .map(|g| Element::new("gene").with_attribute("value", format!("{g:?}")))
            .collect();
        element
    }
}

fn fitness_element(tag: &str, fitness: Option<f64>) -> Element {
    let element = Element::new(tag);
    match fitness {
        Some(score) => element.with_attribute("fitness", score),
        None => element,
    }
}

/// View of a whole population, in order.
#[must_use]
pub fn population_element<G: ToElement>(population: &[G]) -> Element {
    Element::new("population")
        .with_attribute("size", population.len())
        .with_children(population.iter().map(ToElement::to_element))
}

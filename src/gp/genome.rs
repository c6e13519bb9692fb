//! Genome representation for genetic programming.
//!
//! An individual is an ordered list of program chromosomes: chromosome 0 is
//! the result-producing branch, later chromosomes are ADFs it may call.

use crate::error::{EvalResult, GpError};
use crate::node::{NodeRegistry, NodeSpec};
use crate::program::{Program, RunContext, execute_chromosome};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything the evolution loop can evolve.
pub trait Genotype: Clone + Send + Sync {
    /// Canonical encoding; structurally identical genomes share it.
    fn structural_key(&self) -> String;

    /// Cached fitness, if evaluated.
    fn fitness(&self) -> Option<f64>;

    /// Store (or clear) the cached fitness.
    fn set_fitness(&mut self, fitness: Option<f64>);
}

/// A candidate program: one or more chromosomes plus cached fitness.
///
/// Serialized as an [`IndividualRecord`]. Deserializing resolves nodes
/// through the built-in registry; individuals using primitives go through
/// [`IndividualRecord::resolve`] with the registry that knows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "IndividualRecord", try_from = "IndividualRecord")]
pub struct Individual {
    chromosomes: Vec<Program>,
    fitness: Option<f64>,
}

impl Individual {
    /// Unevaluated individual.
    #[must_use]
    pub fn new(chromosomes: Vec<Program>) -> Self {
        Self {
            chromosomes,
            fitness: None,
        }
    }

    /// All chromosomes, result-producing branch first.
    #[must_use]
    pub fn chromosomes(&self) -> &[Program] {
        &self.chromosomes
    }

    /// One chromosome.
    #[must_use]
    pub fn chromosome(&self, index: usize) -> Option<&Program> {
        self.chromosomes.get(index)
    }

    /// Replace one chromosome, clearing the cached fitness.
    pub(crate) fn replace_chromosome(&mut self, index: usize, program: Program) {
        if let Some(slot) = self.chromosomes.get_mut(index) {
            *slot = program;
            self.fitness = None;
        }
    }

    /// Total node count over all chromosomes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.chromosomes.iter().map(Program::len).sum()
    }

    /// Evaluate the result-producing chromosome.
    ///
    /// # Errors
    ///
    /// Returns the fault raised during evaluation.
    pub fn execute(&self, ctx: &mut RunContext) -> EvalResult<Value> {
        execute_chromosome(&self.chromosomes, 0, ctx)
    }

    /// Evaluate and read the result as a boolean.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_bool(&self, ctx: &mut RunContext) -> EvalResult<bool> {
        self.execute(ctx).map(|v| v.to_bool())
    }

    /// Evaluate and read the result as an integer.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_int(&self, ctx: &mut RunContext) -> EvalResult<i32> {
        self.execute(ctx).map(|v| v.to_i32())
    }

    /// Evaluate and read the result as a long.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_long(&self, ctx: &mut RunContext) -> EvalResult<i64> {
        self.execute(ctx).map(|v| v.to_i64())
    }

    /// Evaluate and read the result as a float.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_float(&self, ctx: &mut RunContext) -> EvalResult<f32> {
        self.execute(ctx).map(|v| v.to_f32())
    }

    /// Evaluate and read the result as a double.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_double(&self, ctx: &mut RunContext) -> EvalResult<f64> {
        self.execute(ctx).map(|v| v.to_f64())
    }

    /// Evaluate for side effects only.
    ///
    /// # Errors
    ///
    /// See [`Individual::execute`].
    pub fn execute_void(&self, ctx: &mut RunContext) -> EvalResult<()> {
        self.execute(ctx).map(|_| ())
    }
}

impl Genotype for Individual {
    fn structural_key(&self) -> String {
        let keys: Vec<String> = self.chromosomes.iter().map(Program::structural_key).collect();
        keys.join(" ; ")
    }

    fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    fn set_fitness(&mut self, fitness: Option<f64>) {
        self.fitness = fitness;
    }
}

/// Wire form of an [`Individual`]: every chromosome as its prefix-order
/// list of node specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    /// Node specs per chromosome, result-producing branch first.
    pub chromosomes: Vec<Vec<NodeSpec>>,
    /// Cached fitness, if evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness: Option<f64>,
}

impl IndividualRecord {
    /// Rebuild the individual, resolving every spec through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::UnknownTag`] or [`GpError::InvalidParameter`] for
    /// a spec the registry cannot resolve.
    pub fn resolve(&self, registry: &NodeRegistry) -> Result<Individual, GpError> {
        let chromosomes = self
            .chromosomes
            .iter()
            .map(|specs| registry.resolve_all(specs).map(Program::from_nodes))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Individual {
            chromosomes,
            fitness: self.fitness,
        })
    }
}

impl From<&Individual> for IndividualRecord {
    fn from(individual: &Individual) -> Self {
        Self {
            chromosomes: individual
                .chromosomes
                .iter()
                .map(|program| program.nodes().iter().map(NodeSpec::from).collect())
                .collect(),
            fitness: individual.fitness,
        }
    }
}

impl From<Individual> for IndividualRecord {
    fn from(individual: Individual) -> Self {
        Self::from(&individual)
    }
}

impl TryFrom<IndividualRecord> for Individual {
    type Error = GpError;

    fn try_from(record: IndividualRecord) -> Result<Self, Self::Error> {
        record.resolve(&NodeRegistry::with_builtins())
    }
}

impl fmt::Display for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, program) in self.chromosomes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ; ")?;
            }
            write!(f, "{program}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalFault;
    use crate::node::{Node, Op};
    use crate::types::{TypeSpec, ValueType};

    /// main: (adf1 x 3.0), adf1: (* arg0 arg1)
    fn with_adf() -> Individual {
        let double = TypeSpec::of(ValueType::Double);
        Individual::new(vec![
            Program::from_nodes(vec![
                Node::adf_call(1, double, vec![double, double]),
                Node::variable("x", double),
                Node::constant(Value::Double(3.0)),
            ]),
            Program::from_nodes(vec![
                Node::op(Op::Mul, double),
                Node::adf_arg(0, double),
                Node::adf_arg(1, double),
            ]),
        ])
    }

    #[test]
    fn test_adf_call() {
        let ind = with_adf();
        let env = crate::program::Environment::new().with("x", Value::Double(2.0));
        let mut ctx = RunContext::new(env, 100);
        let result = ind.execute_double(&mut ctx).unwrap();
        assert!((result - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_adf_arg_outside_call_faults() {
        let double = TypeSpec::of(ValueType::Double);
        let ind = Individual::new(vec![Program::from_nodes(vec![Node::adf_arg(0, double)])]);
        let mut ctx = RunContext::default();
        assert_eq!(ind.execute(&mut ctx), Err(EvalFault::MissingArgument(0)));
    }

    #[test]
    fn test_structural_key() {
        let ind = with_adf();
        assert_eq!(ind.to_string(), "(adf1 x 3.0) ; (* arg0 arg1)");
        assert_eq!(
            ind.structural_key(),
            "(adf1:double(double,double) x:double 3.0:double) ; \
             (*:double(double,double) arg0:double arg1:double)"
        );
        let mut copy = ind.clone();
        copy.set_fitness(Some(1.0));
        assert_eq!(copy.structural_key(), ind.structural_key());
        assert_eq!(ind.node_count(), 6);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut ind = with_adf();
        ind.set_fitness(Some(6.0));
        let wire = serde_json::to_string(&ind).unwrap();
        let back: Individual = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, ind);
        assert_eq!(back.structural_key(), ind.structural_key());
        assert_eq!(back.fitness(), Some(6.0));
    }

    #[test]
    fn test_record_with_primitive_resolves_through_registry() {
        let double = TypeSpec::of(ValueType::Double);
        let twice = crate::node::Primitive::new("twice", |args, _| {
            Ok(Value::Double(2.0 * args.first().map_or(0.0, Value::to_f64)))
        });
        let ind = Individual::new(vec![Program::from_nodes(vec![
            Node::primitive(twice.clone(), double, vec![double]),
            Node::constant(Value::Double(4.0)),
        ])]);

        let wire = serde_json::to_string(&ind).unwrap();
        assert!(serde_json::from_str::<Individual>(&wire).is_err());

        let record: IndividualRecord = serde_json::from_str(&wire).unwrap();
        let mut registry = NodeRegistry::with_builtins();
        registry.register_primitive("twice", twice, double, vec![double]);
        let back = record.resolve(&registry).unwrap();
        assert_eq!(back, ind);
        let out = back.execute_double(&mut RunContext::default()).unwrap();
        assert!((out - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_replace_clears_fitness() {
        let mut ind = with_adf();
        ind.set_fitness(Some(4.0));
        ind.replace_chromosome(0, Program::from_nodes(vec![Node::constant(Value::Double(1.0))]));
        assert_eq!(ind.fitness(), None);
        assert_eq!(ind.chromosome(0).map(Program::len), Some(1));
    }
}

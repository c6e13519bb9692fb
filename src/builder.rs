//! Random program construction.
//!
//! [`ProgramSpace`] pairs each chromosome signature with its node set and
//! verifies once, at setup, that every signature can actually be built.
//! [`ProgramBuilder`] then grows trees top-down: every position is filled
//! by a node whose return type the position accepts, optionally vetted by a
//! [`NodeValidator`].
//!
//! Setup computes, for every chromosome, depth limit and tree level, which
//! nodes can still be completed into a tree within bounds. Construction only
//! draws from those, so a build never paints itself into a corner.

use crate::error::GpError;
use crate::gp::Individual;
use crate::node::{Node, NodeKind};
use crate::program::Program;
use crate::types::{Signature, TypeSpec, Value, ValueType};
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Tree termination policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Any branch may end in a terminal once it has reached the minimum depth.
    Grow,
    /// Every branch extends to the depth limit where the vocabulary allows.
    Full,
}

/// Configuration for random construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuilderConfig {
    /// Validator rejections tolerated per position before the candidate is
    /// accepted unconditionally.
    pub max_validation_attempts: usize,
    /// Whole-tree rebuilds tolerated when a tree breaks a structural rule.
    pub max_build_attempts: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_validation_attempts: 10,
            max_build_attempts: 20,
        }
    }
}

/// What a [`NodeValidator`] is asked about.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    /// Node about to be placed.
    pub candidate: &'a Node,
    /// Number of candidates already rejected at this position.
    pub attempt: usize,
    /// Chromosome being built.
    pub chromosome: usize,
    /// Level of the position (1 = root).
    pub depth: usize,
    /// Depth limit of the tree under construction.
    pub required_depth: usize,
    /// Type the position requires.
    pub required: TypeSpec,
    /// Every node that could legally fill the position.
    pub available: &'a [&'a Node],
    /// Whether the tree is built in grow mode.
    pub grow: bool,
}

/// Pluggable structural rule consulted before a node is placed.
pub trait NodeValidator: Send + Sync {
    /// Whether `request.candidate` may be placed.
    fn validate(&self, request: &ValidationRequest<'_>) -> bool;
}

impl<F> NodeValidator for F
where
    F: Fn(&ValidationRequest<'_>) -> bool + Send + Sync,
{
    fn validate(&self, request: &ValidationRequest<'_>) -> bool {
        self(request)
    }
}

/// Nodes that can be completed into a valid tree, per level.
#[derive(Debug, Clone)]
struct Feasibility {
    /// `usable[level - 1]` holds indices into the chromosome's node set.
    usable: Vec<Vec<usize>>,
}

/// Signatures plus node sets, verified at construction.
#[derive(Clone)]
pub struct ProgramSpace {
    signatures: Vec<Signature>,
    node_sets: Vec<Vec<Node>>,
    /// `tables[chromosome][limit - min_depth]`.
    tables: Vec<Vec<Feasibility>>,
    validator: Option<Arc<dyn NodeValidator>>,
}

impl fmt::Debug for ProgramSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramSpace")
            .field("signatures", &self.signatures)
            .field("node_sets", &self.node_sets)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl ProgramSpace {
    /// Verify a vocabulary against its signatures.
    ///
    /// # Errors
    ///
    /// - [`GpError::EmptyVocabulary`] if there are no signatures or the counts
    ///   of signatures and node sets differ.
    /// - [`GpError::InvalidSignature`] for depth bounds outside `1 <= min <= max`.
    /// - [`GpError::AdfOutOfRange`] / [`GpError::AdfSignatureMismatch`] for ADF
    ///   references that disagree with their target's signature.
    /// - [`GpError::NoValidNode`] if some signature cannot be built at all.
    pub fn new(signatures: Vec<Signature>, node_sets: Vec<Vec<Node>>) -> Result<Self, GpError> {
        if signatures.is_empty() || signatures.len() != node_sets.len() {
            return Err(GpError::EmptyVocabulary {
                signatures: signatures.len(),
                node_sets: node_sets.len(),
            });
        }

        for (chromosome, sig) in signatures.iter().enumerate() {
            if sig.min_depth == 0 || sig.min_depth > sig.max_depth {
                return Err(GpError::InvalidSignature {
                    chromosome,
                    min: sig.min_depth,
                    max: sig.max_depth,
                });
            }
            for node in &node_sets[chromosome] {
                check_adf_node(&signatures, chromosome, node)?;
            }
        }

        let mut tables = Vec::with_capacity(signatures.len());
        for (chromosome, sig) in signatures.iter().enumerate() {
            let nodes = &node_sets[chromosome];
            let per_limit: Vec<Feasibility> = (sig.min_depth..=sig.max_depth)
                .map(|limit| feasibility(nodes, sig.min_depth, limit))
                .collect();

            let full = per_limit.last().map_or(&[][..], |f| &f.usable[0][..]);
            if !full.iter().any(|&i| sig.return_type.accepts(&nodes[i].return_type())) {
                return Err(GpError::NoValidNode {
                    chromosome,
                    depth: 1,
                    required: sig.return_type,
                });
            }

            for (i, node) in nodes.iter().enumerate() {
                let placeable = per_limit
                    .last()
                    .is_some_and(|f| f.usable.iter().any(|level| level.contains(&i)));
                if !placeable {
                    warn!("chromosome {chromosome}: node {node} can never be placed");
                }
            }
            tables.push(per_limit);
        }

        debug!(
            "program space ready: {} chromosomes, {} nodes",
            signatures.len(),
            node_sets.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Self {
            signatures,
            node_sets,
            tables,
            validator: None,
        })
    }

    /// Attach a structural validator consulted during construction.
    #[must_use]
    pub fn with_validator(mut self, validator: impl NodeValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Number of chromosome slots.
    #[must_use]
    pub fn chromosome_count(&self) -> usize {
        self.signatures.len()
    }

    /// All signatures.
    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Signature of one chromosome.
    #[must_use]
    pub fn signature(&self, chromosome: usize) -> Option<&Signature> {
        self.signatures.get(chromosome)
    }

    /// Node set of one chromosome.
    #[must_use]
    pub fn nodes(&self, chromosome: usize) -> &[Node] {
        self.node_sets.get(chromosome).map_or(&[], Vec::as_slice)
    }

    /// Whether `program` is a valid tree for `chromosome`: complete, type
    /// correct, within depth bounds and free of blind loops.
    #[must_use]
    pub fn is_valid(&self, chromosome: usize, program: &Program) -> bool {
        let Some(sig) = self.signatures.get(chromosome) else {
            return false;
        };
        program.is_type_valid(sig.return_type)
            && sig.depth_in_bounds(program.depth())
            && program.loops_observe_index()
    }

    /// Whether every chromosome of `individual` is valid.
    #[must_use]
    pub fn is_valid_individual(&self, individual: &Individual) -> bool {
        individual.chromosomes().len() == self.signatures.len()
            && individual
                .chromosomes()
                .iter()
                .enumerate()
                .all(|(i, p)| self.is_valid(i, p))
    }

    fn validator(&self) -> Option<&dyn NodeValidator> {
        self.validator.as_deref()
    }
}

/// ADF references must point forward at a chromosome with a matching
/// signature; argument terminals must exist in their chromosome's signature.
fn check_adf_node(signatures: &[Signature], chromosome: usize, node: &Node) -> Result<(), GpError> {
    match node.kind() {
        NodeKind::AdfCall(target) => {
            let target = *target;
            if target <= chromosome || target >= signatures.len() {
                return Err(GpError::AdfOutOfRange { chromosome, target });
            }
            let sig = &signatures[target];
            if node.return_type() != sig.return_type {
                return Err(GpError::AdfSignatureMismatch {
                    chromosome,
                    target,
                    reason: format!(
                        "returns {} but the ADF returns {}",
                        node.return_type(),
                        sig.return_type
                    ),
                });
            }
            if node.child_types() != sig.arg_types.as_slice() {
                return Err(GpError::AdfSignatureMismatch {
                    chromosome,
                    target,
                    reason: format!(
                        "passes {} arguments, the ADF declares {}",
                        node.arity(),
                        sig.arg_types.len()
                    ),
                });
            }
            Ok(())
        }
        NodeKind::AdfArg(index) => {
            let declared = signatures[chromosome].arg_types.get(*index);
            if declared == Some(&node.return_type()) {
                Ok(())
            } else {
                Err(GpError::AdfSignatureMismatch {
                    chromosome,
                    target: chromosome,
                    reason: format!("argument {index} of type {} is not declared", node.return_type()),
                })
            }
        }
        _ => Ok(()),
    }
}

/// Bottom-up pass: a terminal is usable at or below `min_depth`; a function
/// is usable above `limit` when every child type has a usable node one level
/// further down.
fn feasibility(nodes: &[Node], min_depth: usize, limit: usize) -> Feasibility {
    let mut usable: Vec<Vec<usize>> = vec![Vec::new(); limit];
    for level in (1..=limit).rev() {
        let below = usable.get(level).cloned().unwrap_or_default();
        usable[level - 1] = nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| {
                if node.is_terminal() {
                    level >= min_depth
                } else {
                    level < limit
                        && node.child_types().iter().all(|required| {
                            below
                                .iter()
                                .any(|&i| required.accepts(&nodes[i].return_type()))
                        })
                }
            })
            .map(|(i, _)| i)
            .collect();
    }
    Feasibility { usable }
}

/// Copy a vocabulary node for placement; ephemeral constants draw a fresh
/// value from their range.
#[must_use]
pub fn instantiate<R: Rng>(node: &Node, rng: &mut R) -> Node {
    let mut placed = node.clone();
    if let NodeKind::Constant {
        range: Some(range), ..
    } = node.kind()
    {
        placed.set_value(random_in_range(node.return_type().value, range.min, range.max, rng));
    }
    placed
}

/// Uniform draw from `[min, max]`, rounded for integer categories.
pub(crate) fn random_in_range<R: Rng>(
    ty: ValueType,
    min: f64,
    max: f64,
    rng: &mut R,
) -> Value {
    let x = if max > min { rng.gen_range(min..=max) } else { min };
    let x = match ty {
        ValueType::Integer | ValueType::Long => x.round(),
        _ => x,
    };
    Value::from_f64(ty, x)
}

/// Builds random programs over a [`ProgramSpace`].
#[derive(Debug, Clone, Copy)]
pub struct ProgramBuilder<'a> {
    space: &'a ProgramSpace,
    config: BuilderConfig,
}

impl<'a> ProgramBuilder<'a> {
    /// Builder over `space`.
    #[must_use]
    pub fn new(space: &'a ProgramSpace, config: BuilderConfig) -> Self {
        Self { space, config }
    }

    /// Build one tree for `chromosome` up to its maximum depth.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::NoValidNode`] if the chromosome does not exist or a
    /// position cannot be filled.
    pub fn build_program<R: Rng>(
        &self,
        chromosome: usize,
        mode: GenerationMode,
        rng: &mut R,
    ) -> Result<Program, GpError> {
        self.build_program_to(chromosome, mode, usize::MAX, rng)
    }

    /// Build one tree for `chromosome` whose depth does not exceed `limit`
    /// (clamped into the signature's bounds).
    ///
    /// # Errors
    ///
    /// See [`ProgramBuilder::build_program`].
    pub fn build_program_to<R: Rng>(
        &self,
        chromosome: usize,
        mode: GenerationMode,
        limit: usize,
        rng: &mut R,
    ) -> Result<Program, GpError> {
        let sig = self.space.signature(chromosome).ok_or(GpError::NoValidNode {
            chromosome,
            depth: 0,
            required: TypeSpec::of(ValueType::Void),
        })?;
        let limit = self.usable_limit(chromosome, limit.clamp(sig.min_depth, sig.max_depth));

        let mut program = self.build_once(chromosome, mode, limit, rng)?;
        for attempt in 1..self.config.max_build_attempts {
            if program.loops_observe_index() {
                break;
            }
            debug!("chromosome {chromosome}: rebuilding tree with a blind loop (attempt {attempt})");
            program = self.build_once(chromosome, mode, limit, rng)?;
        }
        if !program.loops_observe_index() {
            warn!("chromosome {chromosome}: build attempts exhausted, keeping a tree with a blind loop");
        }
        Ok(program)
    }

    /// Build one program per chromosome slot.
    ///
    /// # Errors
    ///
    /// See [`ProgramBuilder::build_program`].
    pub fn build_individual<R: Rng>(
        &self,
        mode: GenerationMode,
        rng: &mut R,
    ) -> Result<Individual, GpError> {
        let chromosomes = (0..self.space.chromosome_count())
            .map(|c| self.build_program(c, mode, rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Individual::new(chromosomes))
    }

    /// Ramped half-and-half population: depth limits cycle from each
    /// signature's minimum to its maximum and modes alternate grow/full.
    ///
    /// # Errors
    ///
    /// See [`ProgramBuilder::build_program`].
    pub fn build_population<R: Rng>(&self, size: usize, rng: &mut R) -> Result<Vec<Individual>, GpError> {
        let mut population = Vec::with_capacity(size);
        for i in 0..size {
            let mode = if i % 2 == 0 {
                GenerationMode::Grow
            } else {
                GenerationMode::Full
            };
            let chromosomes = self
                .space
                .signatures()
                .iter()
                .enumerate()
                .map(|(c, sig)| {
                    let span = sig.max_depth - sig.min_depth + 1;
                    let limit = sig.min_depth + (i / 2) % span;
                    self.build_program_to(c, mode, limit, rng)
                })
                .collect::<Result<Vec<_>, _>>()?;
            population.push(Individual::new(chromosomes));
        }
        Ok(population)
    }

    /// Largest limit not above `limit` whose root can be completed; the
    /// signature's maximum always qualifies after setup.
    fn usable_limit(&self, chromosome: usize, limit: usize) -> usize {
        let sig = &self.space.signatures[chromosome];
        let root = sig.return_type;
        let nodes = self.space.nodes(chromosome);
        let tables = &self.space.tables[chromosome];
        (sig.min_depth..=limit)
            .rev()
            .find(|&l| {
                tables[l - sig.min_depth].usable[0]
                    .iter()
                    .any(|&i| root.accepts(&nodes[i].return_type()))
            })
            .unwrap_or(sig.max_depth)
    }

    fn build_once<R: Rng>(
        &self,
        chromosome: usize,
        mode: GenerationMode,
        limit: usize,
        rng: &mut R,
    ) -> Result<Program, GpError> {
        let sig = &self.space.signatures[chromosome];
        let mut nodes = Vec::new();
        self.grow(chromosome, mode, limit, 1, sig.return_type, rng, &mut nodes)?;
        Ok(Program::from_nodes(nodes))
    }

    #[allow(clippy::too_many_arguments)]
    fn grow<R: Rng>(
        &self,
        chromosome: usize,
        mode: GenerationMode,
        limit: usize,
        level: usize,
        required: TypeSpec,
        rng: &mut R,
        out: &mut Vec<Node>,
    ) -> Result<(), GpError> {
        let node = self.pick(chromosome, mode, limit, level, required, rng)?;
        let child_types = node.child_types().to_vec();
        out.push(node);
        for child in child_types {
            self.grow(chromosome, mode, limit, level + 1, child, rng, out)?;
        }
        Ok(())
    }

    fn pick<R: Rng>(
        &self,
        chromosome: usize,
        mode: GenerationMode,
        limit: usize,
        level: usize,
        required: TypeSpec,
        rng: &mut R,
    ) -> Result<Node, GpError> {
        let sig = &self.space.signatures[chromosome];
        let nodes = self.space.nodes(chromosome);
        let usable = self.space.tables[chromosome]
            .get(limit - sig.min_depth)
            .and_then(|t| t.usable.get(level - 1))
            .map_or(&[][..], Vec::as_slice);

        let mut candidates: Vec<&Node> = usable
            .iter()
            .map(|&i| &nodes[i])
            .filter(|n| required.accepts(&n.return_type()))
            .collect();
        if mode == GenerationMode::Full && candidates.iter().any(|n| !n.is_terminal()) {
            candidates.retain(|n| !n.is_terminal());
        }
        if candidates.is_empty() {
            return Err(GpError::NoValidNode {
                chromosome,
                depth: level,
                required,
            });
        }

        let mut attempt = 0;
        let chosen = loop {
            let candidate = candidates[rng.gen_range(0..candidates.len())];
            let Some(validator) = self.space.validator() else {
                break candidate;
            };
            if attempt >= self.config.max_validation_attempts {
                debug!("chromosome {chromosome}: validator retries exhausted at depth {level}");
                break candidate;
            }
            let request = ValidationRequest {
                candidate,
                attempt,
                chromosome,
                depth: level,
                required_depth: limit,
                required,
                available: &candidates,
                grow: mode == GenerationMode::Grow,
            };
            if validator.validate(&request) {
                break candidate;
            }
            attempt += 1;
        };
        Ok(instantiate(chosen, rng))
    }
}

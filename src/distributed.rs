//! Work units for remote evolution.
//!
//! A [`WorkRequest`] carries a (sub)population plus the configuration a
//! worker needs to continue evolving it on its own; a [`WorkResponse`]
//! carries the evolved population back. Transport is left to the caller.
//! Both sides are plain serde types whenever the genome type is. Tree
//! individuals travel as node specs; a worker whose vocabulary holds
//! primitives receives [`WorkRequest<IndividualRecord>`] and resolves it
//! with its own registry.

use crate::config::VocabularyConfig;
use crate::error::GpError;
use crate::gp::{
    Breeder, Evolution, EvolutionConfig, EvolutionStats, FitnessEvaluator, Genotype, Individual,
    IndividualRecord, TreeBreeder,
};
use crate::node::NodeRegistry;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A self-contained unit of evolution work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkRequest<G> {
    /// Caller-chosen identifier echoed in the response.
    pub id: u64,
    /// Settings for the worker's run, seed included.
    pub config: EvolutionConfig,
    /// Program vocabulary for tree genomes; absent for permutations.
    #[serde(default)]
    pub vocabulary: Option<VocabularyConfig>,
    /// Starting population; empty asks the worker to build one.
    pub population: Vec<G>,
}

impl<G> WorkRequest<G> {
    /// Request without a vocabulary.
    #[must_use]
    pub fn new(id: u64, config: EvolutionConfig, population: Vec<G>) -> Self {
        Self {
            id,
            config,
            vocabulary: None,
            population,
        }
    }

    /// Attach the program vocabulary.
    #[must_use]
    pub fn with_vocabulary(mut self, vocabulary: VocabularyConfig) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Tree breeder for this request, resolving its vocabulary through
    /// `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidConfig`] if the request has no vocabulary,
    /// or any error from resolving it.
    pub fn tree_breeder(&self, registry: &NodeRegistry) -> Result<TreeBreeder, GpError> {
        let vocabulary = self
            .vocabulary
            .as_ref()
            .ok_or_else(|| GpError::InvalidConfig("work request carries no vocabulary".to_string()))?;
        let space = vocabulary.build_space(registry)?;
        Ok(TreeBreeder::new(Arc::new(space), &self.config))
    }
}

impl WorkRequest<IndividualRecord> {
    /// Resolve the carried population through `registry`.
    ///
    /// # Errors
    ///
    /// Returns the first resolution error of any individual.
    pub fn resolve(self, registry: &NodeRegistry) -> Result<WorkRequest<Individual>, GpError> {
        let population = self
            .population
            .iter()
            .map(|record| record.resolve(registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkRequest {
            id: self.id,
            config: self.config,
            vocabulary: self.vocabulary,
            population,
        })
    }
}

/// The result of a [`WorkRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkResponse<G> {
    /// Identifier of the request.
    pub id: u64,
    /// Final population, evaluated.
    pub population: Vec<G>,
    /// Best genome found during the run.
    pub best: G,
    /// Run statistics.
    pub stats: EvolutionStats,
}

/// Run a request to completion on this process.
///
/// # Errors
///
/// Returns [`GpError::InvalidConfig`] if the request's configuration does not
/// validate, or a setup error from the breeder.
pub fn execute_request<G, B>(
    request: WorkRequest<G>,
    breeder: B,
    evaluator: FitnessEvaluator<G>,
) -> Result<WorkResponse<G>, GpError>
where
    G: Genotype,
    B: Breeder<G>,
{
    let WorkRequest {
        id,
        config,
        population,
        ..
    } = request;
    info!("work request {id}: {} individuals in", population.len());

    let mut evolution = Evolution::new(config, breeder, evaluator)?.with_population(population);
    let (best, stats) = evolution.run()?;
    let population = evolution.into_population();
    info!(
        "work request {id}: {} individuals out, best {:.4}",
        population.len(),
        stats.best_fitness
    );

    Ok(WorkResponse {
        id,
        population,
        best,
        stats,
    })
}

//! Run configuration loaded from JSON.
//!
//! A [`RunConfig`] pairs the evolution settings with a vocabulary: one
//! [`ChromosomeConfig`] per chromosome slot, naming its nodes by registry
//! tag. Tags are resolved into nodes once, when the program space is built.

use crate::builder::ProgramSpace;
use crate::error::GpError;
use crate::gp::EvolutionConfig;
use crate::node::{NodeRegistry, NodeSpec};
use crate::types::Signature;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One chromosome slot: its signature and the nodes it may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChromosomeConfig {
    /// Declared shape of the slot.
    pub signature: Signature,
    /// Node vocabulary, by registry tag.
    pub nodes: Vec<NodeSpec>,
}

/// Every chromosome slot of an individual, result-producing branch first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    /// Chromosome slots.
    #[serde(default)]
    pub chromosomes: Vec<ChromosomeConfig>,
}

impl VocabularyConfig {
    /// Check depth bounds without resolving any tag.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidConfig`] for a zero minimum depth or a
    /// minimum above the maximum.
    pub fn validate(&self) -> Result<(), GpError> {
        for (i, chromosome) in self.chromosomes.iter().enumerate() {
            let sig = &chromosome.signature;
            if sig.min_depth == 0 || sig.min_depth > sig.max_depth {
                return Err(GpError::InvalidConfig(format!(
                    "chromosome {i}: depth bounds [{}, {}] are not 1 <= min <= max",
                    sig.min_depth, sig.max_depth
                )));
            }
        }
        Ok(())
    }

    /// Resolve every tag through `registry` and build the program space.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::UnknownTag`] or [`GpError::InvalidParameter`] for a
    /// bad node spec, or any setup error from [`ProgramSpace::new`].
    pub fn build_space(&self, registry: &NodeRegistry) -> Result<ProgramSpace, GpError> {
        let signatures = self.chromosomes.iter().map(|c| c.signature.clone()).collect();
        let node_sets = self
            .chromosomes
            .iter()
            .map(|c| registry.resolve_all(&c.nodes))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("resolved vocabulary for {} chromosomes", self.chromosomes.len());
        ProgramSpace::new(signatures, node_sets)
    }
}

/// Everything needed to start a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Evolution settings.
    pub evolution: EvolutionConfig,
    /// Program vocabulary; empty for permutation problems.
    pub vocabulary: VocabularyConfig,
}

impl RunConfig {
    /// Validate both halves.
    ///
    /// # Errors
    ///
    /// Returns [`GpError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<(), GpError> {
        self.evolution.validate()?;
        self.vocabulary.validate()
    }
}

/// Parse and validate a JSON configuration.
///
/// # Errors
///
/// Returns [`GpError::Json`] for malformed JSON and
/// [`GpError::InvalidConfig`] for values that do not validate.
pub fn from_json(json: &str) -> Result<RunConfig, GpError> {
    let config: RunConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load and validate a JSON configuration file.
///
/// # Errors
///
/// Returns [`GpError::Io`] if the file cannot be read, otherwise see
/// [`from_json`].
pub fn load_config(path: impl AsRef<Path>) -> Result<RunConfig, GpError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    debug!("loading configuration from {}", path.as_ref().display());
    from_json(&text)
}

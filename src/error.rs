//! Error types for program construction and evaluation.
//!
//! Two families of failure exist and they never mix:
//!
//! - [`GpError`] is fatal and surfaces at setup time. It means the configured
//!   vocabulary cannot express the programs the signatures require.
//! - [`EvalFault`] is raised while an evolved program runs. It is caught at
//!   the fitness boundary and turned into the worst-score sentinel.

use crate::types::TypeSpec;

/// Fatal configuration or setup error.
#[derive(Debug, thiserror::Error)]
pub enum GpError {
    /// No node in the vocabulary can fill a required position.
    #[error("chromosome {chromosome}: no node returns {required} at depth {depth}")]
    NoValidNode {
        /// Chromosome slot whose vocabulary is incomplete.
        chromosome: usize,
        /// Tree level (1 = root) of the unfillable position.
        depth: usize,
        /// Type the position requires.
        required: TypeSpec,
    },
    /// An ADF reference disagrees with its target chromosome's signature.
    #[error("chromosome {chromosome}: call to ADF {target} does not match its signature: {reason}")]
    AdfSignatureMismatch {
        /// Chromosome whose node set holds the reference.
        chromosome: usize,
        /// Referenced chromosome.
        target: usize,
        /// What disagrees.
        reason: String,
    },
    /// An ADF reference points at itself, an earlier chromosome, or past the end.
    #[error("chromosome {chromosome}: ADF reference {target} out of range")]
    AdfOutOfRange {
        /// Chromosome whose node set holds the reference.
        chromosome: usize,
        /// Referenced chromosome.
        target: usize,
    },
    /// A node tag is not present in the registry.
    #[error("unknown node tag: {0}")]
    UnknownTag(String),
    /// A node tag was found but its parameters were unusable.
    #[error("invalid parameters for {tag}: {reason}")]
    InvalidParameter {
        /// Tag being resolved.
        tag: String,
        /// What was wrong.
        reason: String,
    },
    /// A signature has impossible depth bounds.
    #[error("chromosome {chromosome}: invalid depth bounds [{min}, {max}]")]
    InvalidSignature {
        /// Offending chromosome slot.
        chromosome: usize,
        /// Minimum depth.
        min: usize,
        /// Maximum depth.
        max: usize,
    },
    /// Signature and node set counts disagree, or there are none.
    #[error("program space needs one node set per signature ({signatures} signatures, {node_sets} node sets)")]
    EmptyVocabulary {
        /// Number of signatures supplied.
        signatures: usize,
        /// Number of node sets supplied.
        node_sets: usize,
    },
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Reading a configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parsing a configuration file failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Runtime fault raised by an evaluated program.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalFault {
    /// The program exceeded its step budget.
    #[error("step budget of {steps} exhausted")]
    BudgetExhausted {
        /// Budget that was configured.
        steps: u64,
    },
    /// ADF calls nested deeper than the frame limit.
    #[error("ADF call depth limit reached")]
    RecursionLimit,
    /// An ADF argument was read outside of an ADF call.
    #[error("ADF argument {0} read with no active call frame")]
    MissingArgument(usize),
    /// A primitive or simulated domain entered an impossible state.
    #[error("domain fault: {0}")]
    Domain(String),
}

/// Result type for program evaluation.
pub type EvalResult<T> = Result<T, EvalFault>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn test_error_messages() {
        let err = GpError::NoValidNode {
            chromosome: 1,
            depth: 3,
            required: TypeSpec::of(ValueType::Double),
        };
        let msg = err.to_string();
        assert!(msg.contains("chromosome 1"));
        assert!(msg.contains("double"));

        let fault = EvalFault::BudgetExhausted { steps: 500 };
        assert_eq!(fault.to_string(), "step budget of 500 exhausted");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: Result<u32, _> = serde_json::from_str("not json");
        let err: GpError = parse.unwrap_err().into();
        assert!(matches!(err, GpError::Json(_)));
    }
}

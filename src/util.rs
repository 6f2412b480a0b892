//! Defines the `Error` type for the strata library

use std::result;

use thiserror::Error;

pub type Result<T> = result::Result<T, StrataError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum StrataError {

    /// A node handle that does not belong to the graph it was used with
    #[error("The node is not part of the graph")]
    NodeNotFound,

    /// An edge whose head and tail are the same node
    #[error("Self loops are not allowed")]
    SelfLoop,

    /// An edge between two nodes that are already neighbours
    #[error("The nodes are already connected")]
    DuplicateEdge,

    /// An edge that would close a directed cycle
    #[error("The edge would introduce a directed cycle")]
    CycleDetected,

    /// Represents a request for an edge that does not exist
    #[error("The edge is not part of the graph")]
    EdgeNotFound,

    /// Represents a variable that was present multiple times in a situation where it should only
    /// have been present once
    #[error("Variable {0} was encountered twice")]
    DuplicateVariable(String),

    /// A variable name that could not be resolved
    #[error("Unknown variable {0}")]
    UnknownVariable(String),

    /// Discrete variables need at least two states
    #[error("Invalid cardinality {0}, at least 2 states are required")]
    InvalidCardinality(usize),

    /// An operation that is only defined for latent variables received a manifest one
    #[error("Variable {0} is not latent")]
    NotLatent(String),

    /// Represents an error where a certain constraint on a scope was not satisfied
    #[error("Provided scope did not satisfy constraints")]
    InvalidScope,

    /// Represents the situation when we expected a CPD but did not receive one
    #[error("Requires a Conditional Probability Distribution")]
    NotACPD,

    /// Represents an attempt to initialize a variable with an incompatible Initialization
    #[error("An invalid initialization was provided")]
    InvalidInitialization,

    /// Represents a situation in which there was a non-positive probability provided
    #[error("Encountered a non-positive probability")]
    NonPositiveProbability,

    /// An inference structure was used after the network it was compiled from changed
    #[error("The model changed since the inference structure was built")]
    StaleModel,

    /// Exactly what it sounds like
    #[error("Encountered division by zero")]
    DivideByZero,

    /// There is not enough data provided
    #[error("Not enough data has been provided")]
    NotEnoughData,

    /// A dataset row or column that does not match its declared variables
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A learner or search driver was configured with values it cannot run with
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A general error with the given description
    #[error("{0}")]
    General(String),

}

/// Shorthand used by configuration validation
pub(crate) fn invalid_config<T>(msg: &str) -> Result<T> {
    Err(StrataError::InvalidConfiguration(String::from(msg)))
}

//! Error types for the titration_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for titration_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rule constructed with a comparator outside gt/gte/lt/lte/eq/neq/in
    #[error("Invalid operator {0}")]
    InvalidOperator(String),

    /// A mandatory (boolean-threshold) attribute is absent on the patient
    #[error("Patient has no attribute `{0}`.")]
    MissingAttribute(String),

    /// Dosing ladder construction invariant violated
    #[error("Invalid dosing ladder: {0}")]
    InvalidLadder(String),

    /// Step navigation past the top or bottom of a sub-ladder
    #[error("{medication} has no step {direction} from {dose}")]
    OutOfRange {
        medication: String,
        dose: String,
        direction: &'static str,
    },

    /// Patient is concurrently on more than one medication from one ladder
    #[error("Patient is on multiple medications from the same ladder: {}", .0.join(", "))]
    MultipleActiveMedications(Vec<String>),

    /// Titrator has neither a flat rule list nor both phase rule lists
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    /// Sub-ladder lookup by a name the ladder does not contain
    #[error("Unknown medication: {0}")]
    UnknownMedication(String),

    /// Medication dose is not one of its sub-ladder's steps
    #[error("{medication} {dose} is not a step on the dosing ladder")]
    DoseNotOnLadder { medication: String, dose: String },

    /// Action requires a current medication but the patient has none
    #[error("Action `{0}` requires a current medication")]
    NoCurrentMedication(&'static str),

    /// Protocol file schema error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

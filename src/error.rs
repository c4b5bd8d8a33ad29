//! Error taxonomy for the fulfillment tracking core
use crate::transitions::{DossierStatus, DossierType};

/// A single field-level failure from form validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(thiserror::Error, Debug)]
pub enum DossierError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("caller does not own this order")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("form validation failed ({} error(s))", .0.len())]
    Form(Vec<FieldError>),

    /// Rejected by the transition rule table. Carries the allowed-next set so
    /// callers can present it to the user.
    #[error("transition from {from} to {to} is not allowed for {dossier_type} dossiers")]
    IllegalTransition {
        dossier_type: DossierType,
        from: DossierStatus,
        to: DossierStatus,
        allowed: Vec<DossierStatus>,
    },

    /// The stored status is not a state of the dossier's own machine. Guards
    /// against data corruption; a healthy record never hits this.
    #[error("status {status} is not a known state for {dossier_type} dossiers")]
    InvalidCurrentStatus {
        dossier_type: DossierType,
        status: DossierStatus,
    },

    #[error("upload rejected: {0}")]
    UploadRejected(String),

    /// Conditional write lost a race with a concurrent update. Callers may
    /// retry once with a fresh read.
    #[error("record was modified concurrently")]
    StorageConflict,

    #[error("storage unavailable: {0}")]
    Storage(#[from] sled::Error),

    #[error("stored record corrupt: {0}")]
    Corrupt(String),
}

impl From<minicbor::decode::Error> for DossierError {
    fn from(err: minicbor::decode::Error) -> Self {
        DossierError::Corrupt(err.to_string())
    }
}

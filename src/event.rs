//! Append-only audit events.
//!
//! Events are the queryable history of a dossier, never its source of truth:
//! the current state always lives on the dossier record itself. Once appended
//! an event is never mutated or deleted.

use chrono::Utc;
use uuid7::uuid7;

use crate::dossier::TimeStamp;
use crate::transitions::DossierStatus;

/// Who caused an event.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    #[n(0)]
    System,
    #[n(1)]
    Client,
    #[n(2)]
    Admin,
}

/// What happened, with the payload relevant to that kind of event.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum EventKind {
    /// `old` is `None` for the creation event a freshly derived dossier gets.
    #[n(0)]
    StatusChanged {
        #[n(0)]
        old: Option<DossierStatus>,
        #[n(1)]
        new: DossierStatus,
    },
    #[n(1)]
    DocumentAdded {
        #[n(0)]
        document_id: String,
        #[n(1)]
        file_name: String,
    },
    #[n(2)]
    DocumentRemoved {
        #[n(0)]
        document_id: String,
        #[n(1)]
        file_name: String,
    },
    #[n(3)]
    VtSubmitted {
        #[n(0)]
        photo_count: u32,
    },
    #[n(4)]
    VtSentToBe {
        #[n(0)]
        sent_by: String,
    },
    #[n(5)]
    MetadataUpdated {
        #[n(0)]
        fields: Vec<String>,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::StatusChanged { .. } => "status_changed",
            EventKind::DocumentAdded { .. } => "document_added",
            EventKind::DocumentRemoved { .. } => "document_removed",
            EventKind::VtSubmitted { .. } => "vt_submitted",
            EventKind::VtSentToBe { .. } => "vt_sent_to_be",
            EventKind::MetadataUpdated { .. } => "metadata_updated",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct DossierEvent {
    #[n(0)]
    pub dossier_id: String,
    // uuid7 text, so ids of one dossier sort in creation order
    #[n(1)]
    pub event_id: String,
    #[n(2)]
    pub recorded_at: TimeStamp<Utc>,
    #[n(3)]
    pub source: EventSource,
    #[n(4)]
    pub kind: EventKind,
}

impl DossierEvent {
    pub fn new(dossier_id: &str, source: EventSource, kind: EventKind) -> Self {
        Self {
            dossier_id: dossier_id.to_owned(),
            event_id: uuid7().to_string(),
            recorded_at: TimeStamp::now(),
            source,
            kind,
        }
    }
}

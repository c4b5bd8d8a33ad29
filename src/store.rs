//! Sled-backed persistence for dossiers, their event log and their document
//! references.
//!
//! One tree per record family. Dossiers are keyed `order_id \0 dossier_id` so
//! a prefix scan lists an order; events are keyed `dossier_id \0 event_id`
//! with time-ordered event ids, so an ascending scan is chronological.
//! Status and metadata mutations go through [`DossierStore::swap`], a
//! conditional write against the previously-read encoding.

use std::sync::Arc;

use crate::dossier::Dossier;
use crate::documents::DossierDocument;
use crate::error::DossierError;
use crate::event::DossierEvent;

const SEP: u8 = 0;

fn composite(a: &str, b: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + 1 + b.len());
    key.extend_from_slice(a.as_bytes());
    key.push(SEP);
    key.extend_from_slice(b.as_bytes());
    key
}

fn prefix(a: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(a.len() + 1);
    key.extend_from_slice(a.as_bytes());
    key.push(SEP);
    key
}

fn to_cbor<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, DossierError> {
    minicbor::to_vec(value).map_err(|e| DossierError::Corrupt(e.to_string()))
}

pub struct DossierStore {
    dossiers: sled::Tree,
    events: sled::Tree,
    documents: sled::Tree,
    // bare document_id -> composite documents key, for point lookups
    document_index: sled::Tree,
}

impl DossierStore {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, DossierError> {
        Ok(Self {
            dossiers: db.open_tree("dossiers")?,
            events: db.open_tree("dossier_events")?,
            documents: db.open_tree("dossier_documents")?,
            document_index: db.open_tree("dossier_document_index")?,
        })
    }

    pub fn create_dossier(&self, dossier: &Dossier) -> Result<(), DossierError> {
        let key = composite(&dossier.order_id, &dossier.dossier_id);
        self.dossiers.insert(key, to_cbor(dossier)?)?;
        Ok(())
    }

    pub fn get_dossier(
        &self,
        order_id: &str,
        dossier_id: &str,
    ) -> Result<Option<Dossier>, DossierError> {
        match self.dossiers.get(composite(order_id, dossier_id))? {
            Some(bytes) => Ok(Some(minicbor::decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn dossiers_for_order(&self, order_id: &str) -> Result<Vec<Dossier>, DossierError> {
        let mut out = Vec::new();
        for entry in self.dossiers.scan_prefix(prefix(order_id)) {
            let (_, bytes) = entry?;
            out.push(minicbor::decode(bytes.as_ref())?);
        }
        Ok(out)
    }

    /// Replaces `before` with `after` only if the stored record still matches
    /// `before` byte for byte. A lost race surfaces as `StorageConflict` and
    /// leaves the store untouched.
    pub fn swap_dossier(&self, before: &Dossier, after: &Dossier) -> Result<(), DossierError> {
        let key = composite(&before.order_id, &before.dossier_id);
        self.dossiers
            .compare_and_swap(key, Some(to_cbor(before)?), Some(to_cbor(after)?))?
            .map_err(|_| DossierError::StorageConflict)
    }

    pub fn append_event(&self, event: &DossierEvent) -> Result<(), DossierError> {
        let key = composite(&event.dossier_id, &event.event_id);
        self.events.insert(key, to_cbor(event)?)?;
        Ok(())
    }

    /// Events of one dossier, ascending by time.
    pub fn events_for(&self, dossier_id: &str) -> Result<Vec<DossierEvent>, DossierError> {
        let mut out = Vec::new();
        for entry in self.events.scan_prefix(prefix(dossier_id)) {
            let (_, bytes) = entry?;
            out.push(minicbor::decode(bytes.as_ref())?);
        }
        Ok(out)
    }

    pub fn put_document(&self, document: &DossierDocument) -> Result<(), DossierError> {
        let key = composite(&document.dossier_id, &document.document_id);
        self.documents.insert(key.clone(), to_cbor(document)?)?;
        self.document_index
            .insert(document.document_id.as_bytes(), key)?;
        Ok(())
    }

    pub fn get_document(
        &self,
        document_id: &str,
    ) -> Result<Option<DossierDocument>, DossierError> {
        let Some(key) = self.document_index.get(document_id.as_bytes())? else {
            return Ok(None);
        };
        match self.documents.get(key)? {
            Some(bytes) => Ok(Some(minicbor::decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    pub fn documents_for(&self, dossier_id: &str) -> Result<Vec<DossierDocument>, DossierError> {
        let mut out = Vec::new();
        for entry in self.documents.scan_prefix(prefix(dossier_id)) {
            let (_, bytes) = entry?;
            out.push(minicbor::decode(bytes.as_ref())?);
        }
        Ok(out)
    }

    /// Removes the record and its index entry, returning the removed document
    /// so the caller can clean up the blob and record the audit event.
    pub fn remove_document(
        &self,
        document_id: &str,
    ) -> Result<Option<DossierDocument>, DossierError> {
        let Some(key) = self.document_index.remove(document_id.as_bytes())? else {
            return Ok(None);
        };
        match self.documents.remove(key)? {
            Some(bytes) => Ok(Some(minicbor::decode(bytes.as_ref())?)),
            None => Ok(None),
        }
    }
}

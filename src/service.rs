//! Service layer API for the dossier lifecycle.
//!
//! Every caller-facing operation authenticates against the order's owner
//! (admins may act on any order), mutates through the transition validator
//! and the store's conditional writes, and records an audit event for each
//! change. Status can only ever change through [`FulfillmentService::update_status`]
//! or the compound technical-visit operations built on top of it.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::derive;
use crate::dossier::{Dossier, InstallationPatch, MetadataPatch, TimeStamp, VtFormInput};
use crate::documents::{self, BlobStore, DocumentUpload, DossierDocument, PresignedUrl};
use crate::error::DossierError;
use crate::event::{DossierEvent, EventKind, EventSource};
use crate::order::{OrderDirectory, OrderRecord};
use crate::store::DossierStore;
use crate::transitions::{self, DossierStatus, DossierType};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Admin,
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
}

impl Principal {
    pub fn client(subject: &str) -> Self {
        Self {
            subject: subject.to_owned(),
            role: Role::Client,
        }
    }

    pub fn admin(subject: &str) -> Self {
        Self {
            subject: subject.to_owned(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn event_source(&self) -> EventSource {
        if self.is_admin() {
            EventSource::Admin
        } else {
            EventSource::Client
        }
    }
}

/// A dossier together with its full history, ascending by time.
#[derive(Debug, Clone)]
pub struct DossierDetail {
    pub dossier: Dossier,
    pub events: Vec<DossierEvent>,
}

/// Everything a client needs to upload one file: where to PUT it and the id
/// to hand back when finalizing the attachment.
#[derive(Debug, Clone)]
pub struct UploadSlot {
    pub document_id: String,
    pub storage_key: String,
    pub upload: PresignedUrl,
}

pub struct FulfillmentService<O, B> {
    store: DossierStore,
    orders: O,
    blobs: B,
}

impl<O: OrderDirectory, B: BlobStore> FulfillmentService<O, B> {
    pub fn new(instance: Arc<sled::Db>, orders: O, blobs: B) -> Result<Self, DossierError> {
        Ok(Self {
            store: DossierStore::open(&instance)?,
            orders,
            blobs,
        })
    }

    /// Resolves the order and checks the caller may touch it.
    fn authorize(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<OrderRecord, DossierError> {
        let order = self
            .orders
            .find_order(order_id)?
            .ok_or(DossierError::NotFound("order"))?;

        if order.owner_id != principal.subject && !principal.is_admin() {
            return Err(DossierError::Forbidden);
        }
        Ok(order)
    }

    fn load(&self, order_id: &str, dossier_id: &str) -> Result<Dossier, DossierError> {
        self.store
            .get_dossier(order_id, dossier_id)?
            .ok_or(DossierError::NotFound("dossier"))
    }

    // The mutation an event describes has already happened by the time the
    // append runs; a failed append is a logged anomaly, never a rollback.
    fn record_event(&self, event: DossierEvent) {
        if let Err(err) = self.store.append_event(&event) {
            error!(
                dossier_id = %event.dossier_id,
                kind = event.kind.name(),
                %err,
                "event append failed after state change"
            );
        }
    }

    /// Derives and persists the dossier set for a freshly committed order.
    ///
    /// The order is already committed when this runs: a failure here must not
    /// fail the purchase. It is logged for operator follow-up and returned so
    /// the calling handler can decide what to surface.
    pub fn create_for_order(&self, order_id: &str) -> Result<Vec<Dossier>, DossierError> {
        let order = self
            .orders
            .find_order(order_id)?
            .ok_or(DossierError::NotFound("order"))?;

        let seeds = derive::derive_dossiers(&order.items);
        let mut created = Vec::with_capacity(seeds.len());

        for s in seeds {
            let dossier = Dossier::new(order_id, s.dossier_type, s.initial_status);
            if let Err(err) = self.store.create_dossier(&dossier) {
                error!(
                    order_id,
                    dossier_type = %s.dossier_type,
                    %err,
                    "dossier creation failed after order commit"
                );
                return Err(err);
            }
            self.record_event(DossierEvent::new(
                &dossier.dossier_id,
                EventSource::System,
                EventKind::StatusChanged {
                    old: None,
                    new: dossier.status,
                },
            ));
            created.push(dossier);
        }

        info!(order_id, count = created.len(), "dossiers opened for order");
        Ok(created)
    }

    pub fn list_dossiers(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<Vec<Dossier>, DossierError> {
        self.authorize(principal, order_id)?;
        self.store.dossiers_for_order(order_id)
    }

    pub fn get_dossier(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
    ) -> Result<DossierDetail, DossierError> {
        self.authorize(principal, order_id)?;
        let dossier = self.load(order_id, dossier_id)?;
        let events = self.store.events_for(dossier_id)?;
        Ok(DossierDetail { dossier, events })
    }

    pub fn history(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
    ) -> Result<Vec<DossierEvent>, DossierError> {
        self.authorize(principal, order_id)?;
        self.load(order_id, dossier_id)?;
        self.store.events_for(dossier_id)
    }

    /// The only path by which a dossier's status changes.
    pub fn update_status(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
        new_status: DossierStatus,
    ) -> Result<Dossier, DossierError> {
        self.authorize(principal, order_id)?;
        self.update_status_from(principal.event_source(), order_id, dossier_id, new_status)
    }

    fn update_status_from(
        &self,
        source: EventSource,
        order_id: &str,
        dossier_id: &str,
        new_status: DossierStatus,
    ) -> Result<Dossier, DossierError> {
        let mut retried = false;
        loop {
            let before = self.load(order_id, dossier_id)?;
            transitions::validate_transition(before.dossier_type, before.status, new_status)?;

            let mut after = before.clone();
            after.status = new_status;
            after.updated_at = TimeStamp::now();

            match self.store.swap_dossier(&before, &after) {
                Ok(()) => {
                    self.record_event(DossierEvent::new(
                        dossier_id,
                        source,
                        EventKind::StatusChanged {
                            old: Some(before.status),
                            new: new_status,
                        },
                    ));
                    return Ok(after);
                }
                // one retry against a fresh read, then the conflict surfaces
                Err(DossierError::StorageConflict) if !retried => {
                    retried = true;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Merges a typed patch into the dossier's metadata. Does not touch
    /// status.
    pub fn update_metadata(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
        patch: MetadataPatch,
    ) -> Result<Dossier, DossierError> {
        self.authorize(principal, order_id)?;
        self.update_metadata_from(principal.event_source(), order_id, dossier_id, patch)
    }

    fn update_metadata_from(
        &self,
        source: EventSource,
        order_id: &str,
        dossier_id: &str,
        patch: MetadataPatch,
    ) -> Result<Dossier, DossierError> {
        let mut retried = false;
        loop {
            let before = self.load(order_id, dossier_id)?;

            let mut after = before.clone();
            let changed = after.metadata.apply(patch.clone())?;
            if changed.is_empty() {
                return Err(DossierError::Validation(
                    "metadata patch contains no fields".into(),
                ));
            }
            after.updated_at = TimeStamp::now();

            match self.store.swap_dossier(&before, &after) {
                Ok(()) => {
                    self.record_event(DossierEvent::new(
                        dossier_id,
                        source,
                        EventKind::MetadataUpdated {
                            fields: changed.iter().map(|f| (*f).to_owned()).collect(),
                        },
                    ));
                    return Ok(after);
                }
                Err(DossierError::StorageConflict) if !retried => {
                    retried = true;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn installation_dossier(&self, order_id: &str) -> Result<Dossier, DossierError> {
        self.store
            .dossiers_for_order(order_id)?
            .into_iter()
            .find(|d| d.dossier_type == DossierType::Installation)
            .ok_or(DossierError::NotFound("installation dossier"))
    }

    /// Technical-visit submission: form validation, then metadata + status
    /// moved together under one request. Requires the dossier to still be
    /// waiting for the visit and every referenced photo to be an uploaded
    /// document of this dossier.
    pub fn submit_technical_visit(
        &self,
        principal: &Principal,
        order_id: &str,
        input: VtFormInput,
    ) -> Result<Dossier, DossierError> {
        let form = input.validate().map_err(DossierError::Form)?;

        self.authorize(principal, order_id)?;
        let dossier = self.installation_dossier(order_id)?;

        if dossier.status != DossierStatus::VtPending {
            return Err(DossierError::Validation(format!(
                "technical visit already submitted (current status: {})",
                dossier.status
            )));
        }

        let documents = self.store.documents_for(&dossier.dossier_id)?;
        let missing: Vec<&str> = form
            .photo_ids
            .iter()
            .filter(|id| !documents.iter().any(|d| &d.document_id == *id))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(DossierError::Validation(format!(
                "referenced photos were never uploaded: {}",
                missing.join(", ")
            )));
        }

        let source = principal.event_source();
        let photo_count = form.photo_ids.len() as u32;
        let patch = MetadataPatch::Installation(InstallationPatch {
            vt: Some(form),
            vt_submitted_at: Some(TimeStamp::now()),
            ..Default::default()
        });

        self.update_metadata_from(source, order_id, &dossier.dossier_id, patch)?;
        let updated = self.update_status_from(
            source,
            order_id,
            &dossier.dossier_id,
            DossierStatus::VtCompleted,
        )?;
        self.record_event(DossierEvent::new(
            &dossier.dossier_id,
            source,
            EventKind::VtSubmitted { photo_count },
        ));

        Ok(updated)
    }

    /// Hands a completed technical visit over to the engineering office.
    pub fn send_vt_to_engineering(
        &self,
        principal: &Principal,
        order_id: &str,
    ) -> Result<Dossier, DossierError> {
        self.authorize(principal, order_id)?;
        let dossier = self.installation_dossier(order_id)?;

        if dossier.status != DossierStatus::VtCompleted {
            return Err(DossierError::Validation(format!(
                "technical visit must be completed before the hand-off (current status: {})",
                dossier.status
            )));
        }

        let source = principal.event_source();
        let patch = MetadataPatch::Installation(InstallationPatch {
            vt_sent_to_be_at: Some(TimeStamp::now()),
            ..Default::default()
        });

        self.update_metadata_from(source, order_id, &dossier.dossier_id, patch)?;
        let updated = self.update_status_from(
            source,
            order_id,
            &dossier.dossier_id,
            DossierStatus::AwaitingBe,
        )?;
        self.record_event(DossierEvent::new(
            &dossier.dossier_id,
            source,
            EventKind::VtSentToBe {
                sent_by: principal.subject.clone(),
            },
        ));

        Ok(updated)
    }

    /// Validates the declared file metadata and issues a presigned upload
    /// location plus the document id to finalize with. No record is written
    /// until [`FulfillmentService::attach_document`].
    pub fn upload_slot(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
        file_name: &str,
        content_type: &str,
        size: u64,
    ) -> Result<UploadSlot, DossierError> {
        documents::validate_file(file_name, content_type, size)?;

        let order = self.authorize(principal, order_id)?;
        let dossier = self.load(order_id, dossier_id)?;

        let storage_key =
            documents::storage_key(&order.owner_id, order_id, dossier.dossier_type, file_name);
        let upload = self.blobs.presign_upload(&storage_key, content_type, size)?;

        Ok(UploadSlot {
            document_id: utils::mint_id("doc_"),
            storage_key,
            upload,
        })
    }

    /// Finalizes an upload: persists the document reference and records the
    /// audit event.
    pub fn attach_document(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
        upload: DocumentUpload,
    ) -> Result<DossierDocument, DossierError> {
        documents::validate_file(&upload.file_name, &upload.content_type, upload.size)?;

        self.authorize(principal, order_id)?;
        let dossier = self.load(order_id, dossier_id)?;

        let document = DossierDocument {
            document_id: upload.document_id,
            dossier_id: dossier.dossier_id.clone(),
            order_id: order_id.to_owned(),
            file_name: upload.file_name,
            content_type: upload.content_type,
            size: upload.size,
            storage_key: upload.storage_key,
            uploaded_at: TimeStamp::now(),
            uploaded_by: principal.subject.clone(),
        };
        self.store.put_document(&document)?;

        self.record_event(DossierEvent::new(
            &dossier.dossier_id,
            principal.event_source(),
            EventKind::DocumentAdded {
                document_id: document.document_id.clone(),
                file_name: document.file_name.clone(),
            },
        ));

        Ok(document)
    }

    pub fn list_documents(
        &self,
        principal: &Principal,
        order_id: &str,
        dossier_id: &str,
    ) -> Result<Vec<DossierDocument>, DossierError> {
        self.authorize(principal, order_id)?;
        self.load(order_id, dossier_id)?;
        self.store.documents_for(dossier_id)
    }

    pub fn document_download(
        &self,
        principal: &Principal,
        order_id: &str,
        document_id: &str,
    ) -> Result<PresignedUrl, DossierError> {
        self.authorize(principal, order_id)?;

        let document = self
            .store
            .get_document(document_id)?
            .ok_or(DossierError::NotFound("document"))?;
        if document.order_id != order_id {
            return Err(DossierError::NotFound("document"));
        }

        self.blobs.presign_download(&document.storage_key)
    }

    /// Deletes the document record and its storage object and records the
    /// removal. Dossiers and events are never deleted; documents are the one
    /// record kind that can be.
    pub fn remove_document(
        &self,
        principal: &Principal,
        order_id: &str,
        document_id: &str,
    ) -> Result<(), DossierError> {
        self.authorize(principal, order_id)?;

        let document = self
            .store
            .get_document(document_id)?
            .ok_or(DossierError::NotFound("document"))?;
        if document.order_id != order_id {
            return Err(DossierError::NotFound("document"));
        }

        let removed = self
            .store
            .remove_document(document_id)?
            .ok_or(DossierError::NotFound("document"))?;

        if let Err(err) = self.blobs.delete_object(&removed.storage_key) {
            warn!(document_id, %err, "blob delete failed after record removal");
        }

        self.record_event(DossierEvent::new(
            &removed.dossier_id,
            principal.event_source(),
            EventKind::DocumentRemoved {
                document_id: removed.document_id.clone(),
                file_name: removed.file_name.clone(),
            },
        ));

        Ok(())
    }
}

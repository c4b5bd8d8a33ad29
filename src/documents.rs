//! Document references and the blob-store boundary.
//!
//! The core never touches file bytes. It validates declared metadata, derives
//! the storage key, and asks the blob collaborator for time-bounded upload
//! and download locations.

use std::sync::Mutex;

use chrono::Utc;
use uuid7::uuid7;

use crate::dossier::TimeStamp;
use crate::error::DossierError;
use crate::transitions::DossierType;

pub const ALLOWED_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];
/// 10 MiB, inclusive.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Presigned upload/download locations stay valid for 15 minutes.
pub const PRESIGNED_URL_TTL_SECS: u64 = 15 * 60;

/// A reference to an uploaded file. Belongs to exactly one dossier from
/// creation and is never reparented or updated in place.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct DossierDocument {
    #[n(0)]
    pub document_id: String,
    #[n(1)]
    pub dossier_id: String,
    #[n(2)]
    pub order_id: String,
    #[n(3)]
    pub file_name: String,
    #[n(4)]
    pub content_type: String,
    #[n(5)]
    pub size: u64,
    #[n(6)]
    pub storage_key: String,
    #[n(7)]
    pub uploaded_at: TimeStamp<Utc>,
    #[n(8)]
    pub uploaded_by: String,
}

/// Declared file metadata for an upload that has not been finalized yet.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub document_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
    pub storage_key: String,
}

/// Checks extension, then declared content-type, then size. The first failing
/// check wins; later ones are not evaluated.
pub fn validate_file(file_name: &str, content_type: &str, size: u64) -> Result<(), DossierError> {
    let extension = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    };
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(DossierError::UploadRejected(format!(
            "unsupported file extension, allowed: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    if !ALLOWED_CONTENT_TYPES.contains(&content_type.to_lowercase().as_str()) {
        return Err(DossierError::UploadRejected(format!(
            "unsupported content type, allowed: {}",
            ALLOWED_CONTENT_TYPES.join(", ")
        )));
    }

    if size > MAX_FILE_SIZE {
        return Err(DossierError::UploadRejected(format!(
            "file exceeds the maximum size of {} MiB",
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }
    if size == 0 {
        return Err(DossierError::UploadRejected(
            "file size must be greater than zero".into(),
        ));
    }

    Ok(())
}

/// Builds the storage key for a document:
/// `clients/{owner}/orders/{order}/{concern}/{uuid}_{sanitized name}`.
///
/// The uuid7 prefix is time-ordered and unique, so two uploads of the same
/// file name never collide. Characters outside `[A-Za-z0-9._-]` are replaced.
pub fn storage_key(
    owner_id: &str,
    order_id: &str,
    concern: DossierType,
    file_name: &str,
) -> String {
    let sanitized: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "clients/{owner_id}/orders/{order_id}/{}/{}_{sanitized}",
        concern.as_str(),
        uuid7()
    )
}

/// A time-bounded location issued by the blob collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_in_secs: u64,
}

/// Blob-storage collaborator. Issues presigned locations and deletes objects;
/// the raw bytes never pass through this crate.
pub trait BlobStore {
    fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
    ) -> Result<PresignedUrl, DossierError>;

    fn presign_download(&self, key: &str) -> Result<PresignedUrl, DossierError>;

    fn delete_object(&self, key: &str) -> Result<(), DossierError>;
}

impl<T: BlobStore + ?Sized> BlobStore for std::sync::Arc<T> {
    fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        size: u64,
    ) -> Result<PresignedUrl, DossierError> {
        (**self).presign_upload(key, content_type, size)
    }

    fn presign_download(&self, key: &str) -> Result<PresignedUrl, DossierError> {
        (**self).presign_download(key)
    }

    fn delete_object(&self, key: &str) -> Result<(), DossierError> {
        (**self).delete_object(key)
    }
}

/// In-memory stand-in for tests and local harnesses. Hands out deterministic
/// URLs and remembers which objects were deleted.
#[derive(Debug, Default)]
pub struct MemoryBlobs {
    deleted: Mutex<Vec<String>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("blob stub lock poisoned").clone()
    }
}

impl BlobStore for MemoryBlobs {
    fn presign_upload(
        &self,
        key: &str,
        _content_type: &str,
        _size: u64,
    ) -> Result<PresignedUrl, DossierError> {
        Ok(PresignedUrl {
            url: format!("memory://{key}?verb=put"),
            expires_in_secs: PRESIGNED_URL_TTL_SECS,
        })
    }

    fn presign_download(&self, key: &str) -> Result<PresignedUrl, DossierError> {
        Ok(PresignedUrl {
            url: format!("memory://{key}?verb=get"),
            expires_in_secs: PRESIGNED_URL_TTL_SECS,
        })
    }

    fn delete_object(&self, key: &str) -> Result<(), DossierError> {
        self.deleted
            .lock()
            .expect("blob stub lock poisoned")
            .push(key.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_checked_before_content_type() {
        let err = validate_file("report.exe", "image/jpeg", 100).unwrap_err();
        assert!(err.to_string().contains("extension"));
    }

    #[test]
    fn content_type_is_checked_before_size() {
        let err = validate_file("report.pdf", "text/plain", MAX_FILE_SIZE + 1).unwrap_err();
        assert!(err.to_string().contains("content type"));
    }

    #[test]
    fn size_boundary_is_inclusive() {
        assert!(validate_file("scan.jpg", "image/jpeg", MAX_FILE_SIZE).is_ok());
        assert!(validate_file("scan.jpg", "image/jpeg", MAX_FILE_SIZE + 1).is_err());
        assert!(validate_file("scan.jpg", "image/jpeg", 0).is_err());
    }

    #[test]
    fn file_name_without_extension_is_rejected() {
        assert!(validate_file("README", "application/pdf", 100).is_err());
    }

    #[test]
    fn storage_key_sanitizes_and_never_repeats() {
        let a = storage_key("user_1", "order_1", DossierType::Installation, "roof photo.jpg");
        let b = storage_key("user_1", "order_1", DossierType::Installation, "roof photo.jpg");

        assert!(a.starts_with("clients/user_1/orders/order_1/installation/"));
        assert!(a.ends_with("_roof_photo.jpg"));
        assert_ne!(a, b);
    }
}

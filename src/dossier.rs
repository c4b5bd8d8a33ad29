//! Dossier records and their type-specific metadata payloads.
//!
//! Metadata is a tagged union keyed by the dossier type. Updates arrive as a
//! patch of the same shape; fields left unset keep their stored value, and a
//! patch whose shape does not match the dossier's type is rejected outright.

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{DossierError, FieldError};
use crate::transitions::{DossierStatus, DossierType};
use crate::utils;

/// Minimum number of uploaded photos a technical-visit submission must
/// reference.
pub const MIN_VT_PHOTOS: usize = 3;

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

// Ordering is defined only for the `Utc` timestamps this crate stores, the
// same specialization used for `Encode`/`Decode` below. A `#[derive]` would
// demand `Utc: PartialOrd`, which chrono does not provide.
impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn now() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

/// One fulfillment concern of one order. Created once at order time, mutated
/// through status and metadata updates, never deleted.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Dossier {
    #[n(0)]
    pub order_id: String,
    #[n(1)]
    pub dossier_id: String,
    #[n(2)]
    pub dossier_type: DossierType,
    #[n(3)]
    pub status: DossierStatus,
    #[n(4)]
    pub created_at: TimeStamp<Utc>,
    #[n(5)]
    pub updated_at: TimeStamp<Utc>,
    #[n(6)]
    pub metadata: DossierMetadata,
}

impl Dossier {
    pub fn new(order_id: &str, dossier_type: DossierType, status: DossierStatus) -> Self {
        let now = TimeStamp::now();
        Self {
            order_id: order_id.to_owned(),
            dossier_id: utils::mint_id(dossier_type.id_prefix()),
            dossier_type,
            status,
            created_at: now.clone(),
            updated_at: now,
            metadata: DossierMetadata::empty_for(dossier_type),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub enum DossierMetadata {
    #[n(0)]
    Shipping(#[n(0)] ShippingMetadata),
    #[n(1)]
    Administrative(#[n(0)] AdministrativeMetadata),
    #[n(2)]
    Installation(#[n(0)] InstallationMetadata),
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingMetadata {
    #[n(0)]
    pub carrier: Option<String>,
    #[n(1)]
    pub tracking_number: Option<String>,
    #[n(2)]
    pub estimated_delivery: Option<String>,
    #[n(3)]
    pub delivery_proof_url: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct AdministrativeMetadata {
    #[n(0)]
    pub reference_number: Option<String>,
    #[n(1)]
    pub submission_date: Option<TimeStamp<Utc>>,
    #[n(2)]
    pub response_date: Option<TimeStamp<Utc>>,
    #[n(3)]
    pub rejection_reason: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq)]
pub struct InstallationMetadata {
    #[n(0)]
    pub vt: Option<VtForm>,
    #[n(1)]
    pub vt_submitted_at: Option<TimeStamp<Utc>>,
    #[n(2)]
    pub vt_sent_to_be_at: Option<TimeStamp<Utc>>,
    #[n(3)]
    pub installer_assigned: Option<String>,
    #[n(4)]
    pub installation_date: Option<String>,
}

impl DossierMetadata {
    pub fn empty_for(dossier_type: DossierType) -> Self {
        match dossier_type {
            DossierType::Shipping => DossierMetadata::Shipping(ShippingMetadata::default()),
            DossierType::AdminEnedis | DossierType::AdminConsuel => {
                DossierMetadata::Administrative(AdministrativeMetadata::default())
            }
            DossierType::Installation => {
                DossierMetadata::Installation(InstallationMetadata::default())
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DossierMetadata::Shipping(_) => "shipping",
            DossierMetadata::Administrative(_) => "administrative",
            DossierMetadata::Installation(_) => "installation",
        }
    }

    /// Merges the set fields of `patch` into this payload and returns the
    /// names of the fields that changed. The patch shape must match the
    /// stored shape; nothing is mutated on mismatch.
    pub fn apply(&mut self, patch: MetadataPatch) -> Result<Vec<&'static str>, DossierError> {
        match (self, patch) {
            (DossierMetadata::Shipping(meta), MetadataPatch::Shipping(p)) => {
                let mut changed = Vec::new();
                if let Some(v) = p.carrier {
                    meta.carrier = Some(v);
                    changed.push("carrier");
                }
                if let Some(v) = p.tracking_number {
                    meta.tracking_number = Some(v);
                    changed.push("tracking_number");
                }
                if let Some(v) = p.estimated_delivery {
                    meta.estimated_delivery = Some(v);
                    changed.push("estimated_delivery");
                }
                if let Some(v) = p.delivery_proof_url {
                    meta.delivery_proof_url = Some(v);
                    changed.push("delivery_proof_url");
                }
                Ok(changed)
            }
            (DossierMetadata::Administrative(meta), MetadataPatch::Administrative(p)) => {
                let mut changed = Vec::new();
                if let Some(v) = p.reference_number {
                    meta.reference_number = Some(v);
                    changed.push("reference_number");
                }
                if let Some(v) = p.submission_date {
                    meta.submission_date = Some(v);
                    changed.push("submission_date");
                }
                if let Some(v) = p.response_date {
                    meta.response_date = Some(v);
                    changed.push("response_date");
                }
                if let Some(v) = p.rejection_reason {
                    meta.rejection_reason = Some(v);
                    changed.push("rejection_reason");
                }
                Ok(changed)
            }
            (DossierMetadata::Installation(meta), MetadataPatch::Installation(p)) => {
                let mut changed = Vec::new();
                if let Some(v) = p.vt {
                    meta.vt = Some(v);
                    changed.push("vt");
                }
                if let Some(v) = p.vt_submitted_at {
                    meta.vt_submitted_at = Some(v);
                    changed.push("vt_submitted_at");
                }
                if let Some(v) = p.vt_sent_to_be_at {
                    meta.vt_sent_to_be_at = Some(v);
                    changed.push("vt_sent_to_be_at");
                }
                if let Some(v) = p.installer_assigned {
                    meta.installer_assigned = Some(v);
                    changed.push("installer_assigned");
                }
                if let Some(v) = p.installation_date {
                    meta.installation_date = Some(v);
                    changed.push("installation_date");
                }
                Ok(changed)
            }
            (meta, patch) => Err(DossierError::Validation(format!(
                "{} metadata cannot be applied to a {} dossier",
                patch.kind(),
                meta.kind()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataPatch {
    Shipping(ShippingPatch),
    Administrative(AdministrativePatch),
    Installation(InstallationPatch),
}

impl MetadataPatch {
    pub fn kind(&self) -> &'static str {
        match self {
            MetadataPatch::Shipping(_) => "shipping",
            MetadataPatch::Administrative(_) => "administrative",
            MetadataPatch::Installation(_) => "installation",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingPatch {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<String>,
    pub delivery_proof_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdministrativePatch {
    pub reference_number: Option<String>,
    pub submission_date: Option<TimeStamp<Utc>>,
    pub response_date: Option<TimeStamp<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallationPatch {
    pub vt: Option<VtForm>,
    pub vt_submitted_at: Option<TimeStamp<Utc>>,
    pub vt_sent_to_be_at: Option<TimeStamp<Utc>>,
    pub installer_assigned: Option<String>,
    pub installation_date: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoofType {
    #[n(0)]
    Flat,
    #[n(1)]
    SlopedTiles,
    #[n(2)]
    SlopedSlate,
    #[n(3)]
    Metal,
    #[n(4)]
    Other,
}

impl RoofType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "flat" => Some(RoofType::Flat),
            "sloped_tiles" => Some(RoofType::SlopedTiles),
            "sloped_slate" => Some(RoofType::SlopedSlate),
            "metal" => Some(RoofType::Metal),
            "other" => Some(RoofType::Other),
            _ => None,
        }
    }
}

/// Distance from the turbine mast to the main electrical board.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectricalDistance {
    #[n(0)]
    Under30m,
    #[n(1)]
    From30To60m,
    #[n(2)]
    From60To100m,
    #[n(3)]
    Over100m,
}

impl ElectricalDistance {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "<30m" => Some(ElectricalDistance::Under30m),
            "30-60m" => Some(ElectricalDistance::From30To60m),
            "60-100m" => Some(ElectricalDistance::From60To100m),
            ">100m" => Some(ElectricalDistance::Over100m),
            _ => None,
        }
    }
}

/// A validated technical-visit form as stored in installation metadata.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct VtForm {
    #[n(0)]
    pub roof_type: RoofType,
    #[n(1)]
    pub mounting_height_m: f64,
    #[n(2)]
    pub electrical_distance: ElectricalDistance,
    #[n(3)]
    pub obstacles: Vec<String>,
    #[n(4)]
    pub comments: Option<String>,
    #[n(5)]
    pub photo_ids: Vec<String>,
}

/// Raw technical-visit submission as it arrives from a client, before field
/// validation.
#[derive(Debug, Clone, Default)]
pub struct VtFormInput {
    pub roof_type: Option<String>,
    pub mounting_height_m: Option<f64>,
    pub electrical_distance: Option<String>,
    pub obstacles: Vec<String>,
    pub comments: Option<String>,
    pub photo_ids: Vec<String>,
}

impl VtFormInput {
    /// Checks every field and collects all failures rather than stopping at
    /// the first, so a client can fix the whole form in one round trip.
    pub fn validate(self) -> Result<VtForm, Vec<FieldError>> {
        let mut errors = Vec::new();

        let roof_type = match self.roof_type.as_deref() {
            None => {
                errors.push(FieldError {
                    field: "roof_type",
                    message: "roof type is required".into(),
                });
                None
            }
            Some(raw) => {
                let parsed = RoofType::parse(raw);
                if parsed.is_none() {
                    errors.push(FieldError {
                        field: "roof_type",
                        message: format!("unknown roof type: {raw}"),
                    });
                }
                parsed
            }
        };

        let mounting_height_m = match self.mounting_height_m {
            None => {
                errors.push(FieldError {
                    field: "mounting_height_m",
                    message: "mounting height is required".into(),
                });
                None
            }
            Some(h) if !h.is_finite() || h < 0.0 => {
                errors.push(FieldError {
                    field: "mounting_height_m",
                    message: "mounting height must be a non-negative number".into(),
                });
                None
            }
            Some(h) => Some(h),
        };

        let electrical_distance = match self.electrical_distance.as_deref() {
            None => {
                errors.push(FieldError {
                    field: "electrical_distance",
                    message: "electrical distance is required".into(),
                });
                None
            }
            Some(raw) => {
                let parsed = ElectricalDistance::parse(raw);
                if parsed.is_none() {
                    errors.push(FieldError {
                        field: "electrical_distance",
                        message: format!("unknown electrical distance: {raw}"),
                    });
                }
                parsed
            }
        };

        if self.photo_ids.len() < MIN_VT_PHOTOS {
            errors.push(FieldError {
                field: "photo_ids",
                message: format!(
                    "at least {MIN_VT_PHOTOS} photos are required ({} provided)",
                    self.photo_ids.len()
                ),
            });
        }

        // Every None above pushed an error, so a fully-Some triple means the
        // form is clean.
        match (roof_type, mounting_height_m, electrical_distance) {
            (Some(roof_type), Some(mounting_height_m), Some(electrical_distance))
                if errors.is_empty() =>
            {
                Ok(VtForm {
                    roof_type,
                    mounting_height_m,
                    electrical_distance,
                    obstacles: self.obstacles,
                    comments: self.comments,
                    photo_ids: self.photo_ids,
                })
            }
            _ => Err(errors),
        }
    }
}

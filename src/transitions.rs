//! Dossier types, status sets and the transition rule table.
//!
//! The table is declarative adjacency data: one entry per reachable status,
//! mapping to the statuses it may move to. An empty edge set marks a terminal
//! state. Validation is a single generic lookup over this data so a new
//! dossier type is a new table, not new logic.

use std::fmt;
use std::str::FromStr;

use crate::error::DossierError;

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum DossierType {
    #[n(0)]
    Shipping,
    #[n(1)]
    AdminEnedis,
    #[n(2)]
    AdminConsuel,
    #[n(3)]
    Installation,
}

pub const DOSSIER_TYPES: [DossierType; 4] = [
    DossierType::Shipping,
    DossierType::AdminEnedis,
    DossierType::AdminConsuel,
    DossierType::Installation,
];

impl DossierType {
    pub fn as_str(self) -> &'static str {
        match self {
            DossierType::Shipping => "shipping",
            DossierType::AdminEnedis => "admin_enedis",
            DossierType::AdminConsuel => "admin_consuel",
            DossierType::Installation => "installation",
        }
    }

    /// Human-readable prefix used when minting dossier ids.
    pub fn id_prefix(self) -> &'static str {
        match self {
            DossierType::Shipping => "shipping_",
            DossierType::AdminEnedis => "enedis_",
            DossierType::AdminConsuel => "consuel_",
            DossierType::Installation => "install_",
        }
    }
}

impl fmt::Display for DossierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DossierType {
    type Err = DossierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipping" => Ok(DossierType::Shipping),
            "admin_enedis" => Ok(DossierType::AdminEnedis),
            "admin_consuel" => Ok(DossierType::AdminConsuel),
            "installation" => Ok(DossierType::Installation),
            other => Err(DossierError::Validation(format!(
                "unknown dossier type: {other}"
            ))),
        }
    }
}

/// Every status any dossier type can carry. Which subset applies is decided
/// by the type's rule table; `validated` is shared by the administrative and
/// installation machines.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub enum DossierStatus {
    // shipping
    #[n(0)]
    Received,
    #[n(1)]
    Preparing,
    #[n(2)]
    Shipped,
    #[n(3)]
    Delivered,
    #[n(4)]
    Issue,
    // administrative
    #[n(5)]
    NotStarted,
    #[n(6)]
    InProgress,
    #[n(7)]
    Validated,
    #[n(8)]
    Rejected,
    // installation
    #[n(9)]
    VtPending,
    #[n(10)]
    VtCompleted,
    #[n(11)]
    AwaitingBe,
}

impl DossierStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DossierStatus::Received => "received",
            DossierStatus::Preparing => "preparing",
            DossierStatus::Shipped => "shipped",
            DossierStatus::Delivered => "delivered",
            DossierStatus::Issue => "issue",
            DossierStatus::NotStarted => "not_started",
            DossierStatus::InProgress => "in_progress",
            DossierStatus::Validated => "validated",
            DossierStatus::Rejected => "rejected",
            DossierStatus::VtPending => "vt_pending",
            DossierStatus::VtCompleted => "vt_completed",
            DossierStatus::AwaitingBe => "awaiting_be",
        }
    }
}

impl fmt::Display for DossierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DossierStatus {
    type Err = DossierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(DossierStatus::Received),
            "preparing" => Ok(DossierStatus::Preparing),
            "shipped" => Ok(DossierStatus::Shipped),
            "delivered" => Ok(DossierStatus::Delivered),
            "issue" => Ok(DossierStatus::Issue),
            "not_started" => Ok(DossierStatus::NotStarted),
            "in_progress" => Ok(DossierStatus::InProgress),
            "validated" => Ok(DossierStatus::Validated),
            "rejected" => Ok(DossierStatus::Rejected),
            "vt_pending" => Ok(DossierStatus::VtPending),
            "vt_completed" => Ok(DossierStatus::VtCompleted),
            "awaiting_be" => Ok(DossierStatus::AwaitingBe),
            other => Err(DossierError::Validation(format!(
                "unknown dossier status: {other}"
            ))),
        }
    }
}

type Rules = &'static [(DossierStatus, &'static [DossierStatus])];

use DossierStatus::*;

const SHIPPING_RULES: Rules = &[
    (Received, &[Preparing]),
    (Preparing, &[Shipped]),
    (Shipped, &[Delivered, Issue]),
    (Delivered, &[Issue]),
    (Issue, &[Preparing, Shipped]),
];

// Enedis and Consuel run the same machine but track independent processes.
const ADMIN_RULES: Rules = &[
    (NotStarted, &[InProgress]),
    (InProgress, &[Validated, Rejected]),
    (Rejected, &[InProgress]),
    (Validated, &[]),
];

const INSTALLATION_RULES: Rules = &[
    (VtPending, &[VtCompleted]),
    (VtCompleted, &[AwaitingBe]),
    (AwaitingBe, &[Validated]),
    (Validated, &[]),
];

pub fn rule_table(dossier_type: DossierType) -> Rules {
    match dossier_type {
        DossierType::Shipping => SHIPPING_RULES,
        DossierType::AdminEnedis | DossierType::AdminConsuel => ADMIN_RULES,
        DossierType::Installation => INSTALLATION_RULES,
    }
}

/// The status every dossier of this type starts in.
pub fn initial_status(dossier_type: DossierType) -> DossierStatus {
    match dossier_type {
        DossierType::Shipping => Received,
        DossierType::AdminEnedis | DossierType::AdminConsuel => NotStarted,
        DossierType::Installation => VtPending,
    }
}

/// The statuses reachable from `status`, or `None` when `status` is not a
/// state of this type's machine at all.
pub fn allowed_next(
    dossier_type: DossierType,
    status: DossierStatus,
) -> Option<&'static [DossierStatus]> {
    rule_table(dossier_type)
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, next)| *next)
}

pub fn is_terminal(dossier_type: DossierType, status: DossierStatus) -> bool {
    allowed_next(dossier_type, status).is_some_and(|next| next.is_empty())
}

/// Checks a requested status change against the rule table. Pure; knows
/// nothing about storage and never mutates anything.
pub fn validate_transition(
    dossier_type: DossierType,
    current: DossierStatus,
    requested: DossierStatus,
) -> Result<(), DossierError> {
    let Some(allowed) = allowed_next(dossier_type, current) else {
        return Err(DossierError::InvalidCurrentStatus {
            dossier_type,
            status: current,
        });
    };

    if !allowed.contains(&requested) {
        return Err(DossierError::IllegalTransition {
            dossier_type,
            from: current,
            to: requested,
            allowed: allowed.to_vec(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_statuses_are_table_keys() {
        for dossier_type in DOSSIER_TYPES {
            let initial = initial_status(dossier_type);
            assert!(
                allowed_next(dossier_type, initial).is_some(),
                "initial status {initial} missing from {dossier_type} table"
            );
        }
    }

    #[test]
    fn validated_is_terminal_for_admin_and_installation() {
        assert!(is_terminal(DossierType::AdminEnedis, Validated));
        assert!(is_terminal(DossierType::AdminConsuel, Validated));
        assert!(is_terminal(DossierType::Installation, Validated));
        assert!(!is_terminal(DossierType::Shipping, Delivered));
    }

    #[test]
    fn foreign_status_is_invalid_current() {
        let err = validate_transition(DossierType::Shipping, Validated, Preparing).unwrap_err();
        assert!(matches!(
            err,
            DossierError::InvalidCurrentStatus {
                dossier_type: DossierType::Shipping,
                status: Validated,
            }
        ));
    }

    #[test]
    fn status_strings_round_trip() {
        for dossier_type in DOSSIER_TYPES {
            for (status, _) in rule_table(dossier_type) {
                let parsed: DossierStatus = status.as_str().parse().unwrap();
                assert_eq!(parsed, *status);
            }
            let parsed: DossierType = dossier_type.as_str().parse().unwrap();
            assert_eq!(parsed, dossier_type);
        }
    }
}

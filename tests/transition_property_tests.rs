//! Property-based tests for the transition rule table and the order deriver.
//!
//! The rule table is the authority for every status change in the system and
//! the deriver decides what tracking an order gets at all. These tests pin
//! the invariants that must hold for any input, not just the handpicked
//! cases in the unit suite.

use eolia_fulfillment::{
    derive::derive_dossiers,
    error::DossierError,
    order::{OrderItem, ProductCategory},
    transitions::{
        self, DossierStatus, DossierType, allowed_next, initial_status, validate_transition,
    },
};
use proptest::prelude::*;

static ALL_STATUSES: [DossierStatus; 12] = [
    DossierStatus::Received,
    DossierStatus::Preparing,
    DossierStatus::Shipped,
    DossierStatus::Delivered,
    DossierStatus::Issue,
    DossierStatus::NotStarted,
    DossierStatus::InProgress,
    DossierStatus::Validated,
    DossierStatus::Rejected,
    DossierStatus::VtPending,
    DossierStatus::VtCompleted,
    DossierStatus::AwaitingBe,
];

fn dossier_type_strategy() -> impl Strategy<Value = DossierType> {
    prop_oneof![
        Just(DossierType::Shipping),
        Just(DossierType::AdminEnedis),
        Just(DossierType::AdminConsuel),
        Just(DossierType::Installation),
    ]
}

fn status_strategy() -> impl Strategy<Value = DossierStatus> {
    proptest::sample::select(&ALL_STATUSES[..])
}

fn category_strategy() -> impl Strategy<Value = Option<ProductCategory>> {
    prop_oneof![
        Just(None),
        Just(Some(ProductCategory::Turbine)),
        Just(Some(ProductCategory::Inverter)),
        Just(Some(ProductCategory::Accessory)),
        Just(Some(ProductCategory::Administrative)),
        Just(Some(ProductCategory::Installation)),
    ]
}

fn items_strategy() -> impl Strategy<Value = Vec<OrderItem>> {
    prop::collection::vec(category_strategy(), 0..12).prop_map(|categories| {
        categories
            .into_iter()
            .enumerate()
            .map(|(i, category)| OrderItem {
                product_id: format!("prod_{i}"),
                name: format!("product {i}"),
                quantity: 1,
                price: 1_000_00,
                category,
            })
            .collect()
    })
}

proptest! {
    /// The validator is a pure lookup: a transition passes exactly when the
    /// table lists it, for any (type, from, to) triple.
    #[test]
    fn prop_validator_matches_table(
        dossier_type in dossier_type_strategy(),
        from in status_strategy(),
        to in status_strategy(),
    ) {
        let result = validate_transition(dossier_type, from, to);
        match allowed_next(dossier_type, from) {
            None => prop_assert!(result.is_err(), "foreign status must be rejected"),
            Some(allowed) => prop_assert_eq!(result.is_ok(), allowed.contains(&to)),
        }
    }

    /// A table rejection always reports the complete allowed-next set, never
    /// a truncated or stale one.
    #[test]
    fn prop_rejection_reports_the_full_allowed_set(
        dossier_type in dossier_type_strategy(),
        from in status_strategy(),
        to in status_strategy(),
    ) {
        if let Err(DossierError::IllegalTransition { allowed, .. }) =
            validate_transition(dossier_type, from, to)
        {
            prop_assert_eq!(
                allowed.as_slice(),
                allowed_next(dossier_type, from).expect("from is a table key")
            );
        }
    }

    /// Permuting the line items never changes the derived dossier set.
    #[test]
    fn prop_derivation_ignores_item_order(
        items in items_strategy(),
        rotation in 0usize..12,
    ) {
        let mut permuted = items.clone();
        permuted.reverse();
        if !permuted.is_empty() {
            let r = rotation % permuted.len();
            permuted.rotate_left(r);
        }

        prop_assert_eq!(derive_dossiers(&items), derive_dossiers(&permuted));
    }

    /// Repeating every item changes nothing: derivation is deduplicated by
    /// dossier type.
    #[test]
    fn prop_derivation_is_idempotent_over_duplicates(items in items_strategy()) {
        let mut doubled = items.clone();
        doubled.extend(items.iter().cloned());

        prop_assert_eq!(derive_dossiers(&items), derive_dossiers(&doubled));
    }

    /// Each dossier type appears at most once and always starts in its rule
    /// table's initial status.
    #[test]
    fn prop_seeds_are_unique_and_start_at_initial(items in items_strategy()) {
        let seeds = derive_dossiers(&items);

        let mut types: Vec<_> = seeds.iter().map(|s| s.dossier_type).collect();
        types.sort();
        types.dedup();
        prop_assert_eq!(types.len(), seeds.len());

        for seed in seeds {
            prop_assert_eq!(seed.initial_status, initial_status(seed.dossier_type));
        }
    }

    /// Status names survive the string boundary both ways.
    #[test]
    fn prop_status_strings_round_trip(status in status_strategy()) {
        let parsed: DossierStatus = status.as_str().parse().expect("known status");
        prop_assert_eq!(parsed, status);
    }
}

/// An order containing every category derives the complete dossier set; this
/// anchors the property tests with one exact expectation.
#[test]
fn all_categories_yield_the_full_set() {
    let items: Vec<OrderItem> = [
        ProductCategory::Turbine,
        ProductCategory::Inverter,
        ProductCategory::Accessory,
        ProductCategory::Administrative,
        ProductCategory::Installation,
    ]
    .into_iter()
    .enumerate()
    .map(|(i, category)| OrderItem {
        product_id: format!("prod_{i}"),
        name: format!("product {i}"),
        quantity: 1,
        price: 1_000_00,
        category: Some(category),
    })
    .collect();

    let seeds = derive_dossiers(&items);
    let types: Vec<_> = seeds.iter().map(|s| s.dossier_type).collect();
    assert_eq!(types, transitions::DOSSIER_TYPES.to_vec());
}

//! Decides which dossiers a new order needs, from its line items.

use crate::order::{OrderItem, ProductCategory};
use crate::transitions::{self, DossierStatus, DossierType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DossierSeed {
    pub dossier_type: DossierType,
    pub initial_status: DossierStatus,
}

fn seed(dossier_type: DossierType) -> DossierSeed {
    DossierSeed {
        dossier_type,
        initial_status: transitions::initial_status(dossier_type),
    }
}

/// Maps line-item categories to the set of dossiers to open. Deduplicated by
/// type and emitted in a fixed order, so the result does not depend on how
/// the items are arranged. Items without a category contribute nothing; an
/// order matching no category yields an empty set.
pub fn derive_dossiers(items: &[OrderItem]) -> Vec<DossierSeed> {
    let mut shipping = false;
    let mut administrative = false;
    let mut installation = false;

    for item in items {
        match item.category {
            Some(category) if category.is_physical() => shipping = true,
            Some(ProductCategory::Administrative) => administrative = true,
            Some(ProductCategory::Installation) => installation = true,
            _ => {}
        }
    }

    let mut seeds = Vec::new();
    if shipping {
        seeds.push(seed(DossierType::Shipping));
    }
    if administrative {
        // the two administrative processes always open together
        seeds.push(seed(DossierType::AdminEnedis));
        seeds.push(seed(DossierType::AdminConsuel));
    }
    if installation {
        seeds.push(seed(DossierType::Installation));
    }
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: Option<ProductCategory>) -> OrderItem {
        OrderItem {
            product_id: "prod_1".into(),
            name: "item".into(),
            quantity: 1,
            price: 100_00,
            category,
        }
    }

    #[test]
    fn empty_order_derives_nothing() {
        assert!(derive_dossiers(&[]).is_empty());
        assert!(derive_dossiers(&[item(None)]).is_empty());
    }

    #[test]
    fn initial_statuses_come_from_the_rule_table() {
        let seeds = derive_dossiers(&[
            item(Some(ProductCategory::Turbine)),
            item(Some(ProductCategory::Administrative)),
            item(Some(ProductCategory::Installation)),
        ]);

        for s in seeds {
            assert_eq!(s.initial_status, transitions::initial_status(s.dossier_type));
        }
    }
}

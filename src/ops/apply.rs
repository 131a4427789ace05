//! Mutation applier: validated operations against a working asset list.
//!
//! Never fails. Every inapplicable operation becomes a `skipped` outcome with
//! a human-readable reason; the batch keeps going.

use rust_decimal::Decimal;

use crate::ops::{Operation, OperationOutcome, OutcomeStatus};
use crate::portfolio::{Asset, Chain, PhysicalSymbol, find_asset_index};

/// Result of applying one batch against a working copy.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub outcomes: Vec<OperationOutcome>,
    /// True when at least one operation changed state; the caller persists
    /// the document only in that case.
    pub mutated: bool,
}

/// Apply operations strictly in input order against one working copy, so
/// later operations observe earlier effects.
pub fn apply_batch(assets: &mut Vec<Asset>, operations: &[Operation]) -> BatchOutcome {
    let mut outcomes = Vec::with_capacity(operations.len());
    let mut mutated = false;

    for operation in operations {
        let outcome = apply_operation(assets, operation);
        if outcome.status == OutcomeStatus::Applied {
            mutated = true;
        }
        outcomes.push(outcome);
    }

    BatchOutcome { outcomes, mutated }
}

/// Apply one validated operation, returning exactly one outcome.
pub fn apply_operation(assets: &mut Vec<Asset>, operation: &Operation) -> OperationOutcome {
    match operation {
        Operation::AddChain {
            chain,
            address,
            label,
        } => apply_add_chain(assets, *chain, address, label.as_deref()),
        Operation::AddPhysical {
            symbol,
            quantity,
            label,
        } => apply_add_physical(assets, *symbol, *quantity, label.as_deref()),
        Operation::Remove { identifier } => apply_remove(assets, identifier),
        Operation::Update {
            identifier,
            label,
            quantity,
            address,
        } => apply_update(
            assets,
            identifier,
            label.as_deref(),
            *quantity,
            address.as_deref(),
        ),
    }
}

fn last_chars(value: &str, count: usize) -> &str {
    let start = value
        .char_indices()
        .rev()
        .nth(count.saturating_sub(1))
        .map(|(index, _)| index)
        .unwrap_or(0);
    &value[start..]
}

fn default_chain_label(chain: Chain, address: &str) -> String {
    format!(
        "{} {}",
        chain.as_str().to_uppercase(),
        last_chars(address, 4)
    )
}

fn normalized_label(label: Option<&str>) -> Option<String> {
    label
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(String::from)
}

fn apply_add_chain(
    assets: &mut Vec<Asset>,
    chain: Chain,
    address: &str,
    label: Option<&str>,
) -> OperationOutcome {
    let address = address.trim();
    if address.is_empty() {
        return OperationOutcome::skipped("add", format!("Missing address for {chain}"));
    }

    let label =
        normalized_label(label).unwrap_or_else(|| default_chain_label(chain, address));
    assets.push(Asset::new_blockchain(label.clone(), chain, address));
    OperationOutcome::applied(format!("add-{chain}"), format!("Added {label} ({address})"))
}

fn apply_add_physical(
    assets: &mut Vec<Asset>,
    symbol: PhysicalSymbol,
    quantity: Decimal,
    label: Option<&str>,
) -> OperationOutcome {
    if quantity <= Decimal::ZERO {
        return OperationOutcome::skipped("add-physical", format!("Invalid quantity for {symbol}"));
    }

    let label = normalized_label(label).unwrap_or_else(|| symbol.as_str().to_string());
    assets.push(Asset::new_physical(label.clone(), symbol, quantity));
    OperationOutcome::applied(
        format!("add-{}", symbol.as_str().to_lowercase()),
        format!("Added {label} with {} units", quantity.normalize()),
    )
}

fn apply_remove(assets: &mut Vec<Asset>, identifier: &str) -> OperationOutcome {
    match find_asset_index(assets, identifier) {
        None => OperationOutcome::skipped(
            "remove",
            format!("No asset found matching \"{identifier}\""),
        ),
        Some(index) => {
            let removed = assets.remove(index);
            OperationOutcome::applied("remove", format!("Removed {}", removed.label()))
        }
    }
}

fn apply_update(
    assets: &mut [Asset],
    identifier: &str,
    label: Option<&str>,
    quantity: Option<Decimal>,
    address: Option<&str>,
) -> OperationOutcome {
    let Some(index) = find_asset_index(assets, identifier) else {
        return OperationOutcome::skipped(
            "update",
            format!("No asset found matching \"{identifier}\""),
        );
    };
    let asset = &mut assets[index];

    // An invalid quantity rejects the whole update before any field changes.
    if matches!(asset, Asset::Physical(_)) && quantity.is_some_and(|q| q < Decimal::ZERO) {
        return OperationOutcome::skipped("update", "Quantity must be a non-negative number");
    }

    let mut changes = Vec::new();

    if let Some(label) = normalized_label(label) {
        changes.push(format!("label -> {label}"));
        match asset {
            Asset::Blockchain(entry) => entry.label = label,
            Asset::Physical(entry) => entry.label = label,
        }
    }

    match asset {
        Asset::Physical(entry) => {
            if let Some(quantity) = quantity {
                entry.quantity = quantity;
                changes.push(format!("quantity -> {}", quantity.normalize()));
            }
        }
        Asset::Blockchain(entry) => {
            if let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) {
                entry.address = address.to_string();
                changes.push(format!("address -> {address}"));
            }
        }
    }

    if changes.is_empty() {
        return OperationOutcome::skipped("update", "No valid fields to update");
    }

    OperationOutcome::applied(
        "update",
        format!("Updated {}: {}", asset.label(), changes.join(", ")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn add_chain(chain: Chain, address: &str) -> Operation {
        Operation::AddChain {
            chain,
            address: address.to_string(),
            label: None,
        }
    }

    #[test]
    fn add_grows_list_by_one_with_unique_id() {
        let mut assets = vec![Asset::new_physical("GOLD", PhysicalSymbol::Gold, dec!(1))];
        let before = assets.len();

        let outcome = apply_operation(&mut assets, &add_chain(Chain::Bitcoin, "bc1qabcd"));
        assert_eq!(outcome.status, OutcomeStatus::Applied);
        assert_eq!(assets.len(), before + 1);

        let ids: HashSet<_> = assets.iter().map(Asset::id).collect();
        assert_eq!(ids.len(), assets.len());
    }

    #[test]
    fn add_chain_derives_default_label() {
        let mut assets = Vec::new();
        let outcome = apply_operation(&mut assets, &add_chain(Chain::Ethereum, "0xdeadbeef"));
        assert_eq!(outcome.action, "add-ethereum");
        assert_eq!(assets[0].label(), "ETHEREUM beef");
    }

    #[test]
    fn add_chain_rejects_blank_address() {
        let mut assets = Vec::new();
        let outcome = apply_operation(&mut assets, &add_chain(Chain::Bitcoin, "   "));
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert!(assets.is_empty());
        assert_eq!(outcome.detail, "Missing address for bitcoin");
    }

    #[test]
    fn add_physical_rejects_non_positive_quantity() {
        let mut assets = Vec::new();
        let outcome = apply_operation(
            &mut assets,
            &Operation::AddPhysical {
                symbol: PhysicalSymbol::Gold,
                quantity: Decimal::ZERO,
                label: None,
            },
        );
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.detail, "Invalid quantity for GOLD");
        assert!(assets.is_empty());
    }

    #[test]
    fn add_physical_defaults_label_to_symbol() {
        let mut assets = Vec::new();
        let outcome = apply_operation(
            &mut assets,
            &Operation::AddPhysical {
                symbol: PhysicalSymbol::Usd,
                quantity: dec!(250),
                label: None,
            },
        );
        assert_eq!(outcome.action, "add-usd");
        assert_eq!(assets[0].label(), "USD");
    }

    #[test]
    fn remove_miss_leaves_list_unchanged() {
        let mut assets = vec![Asset::new_physical("Vault gold", PhysicalSymbol::Gold, dec!(1))];
        let snapshot = assets.clone();

        let outcome = apply_operation(
            &mut assets,
            &Operation::Remove {
                identifier: "nothing here".to_string(),
            },
        );
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(assets, snapshot);
    }

    #[test]
    fn remove_preserves_order_of_remaining_assets() {
        let mut assets = vec![
            Asset::new_physical("a", PhysicalSymbol::Gold, dec!(1)),
            Asset::new_physical("b", PhysicalSymbol::Usd, dec!(2)),
            Asset::new_physical("c", PhysicalSymbol::Gold, dec!(3)),
        ];
        apply_operation(
            &mut assets,
            &Operation::Remove {
                identifier: "b".to_string(),
            },
        );
        let labels: Vec<_> = assets.iter().map(Asset::label).collect();
        assert_eq!(labels, vec!["a", "c"]);
    }

    #[test]
    fn update_negative_quantity_skips_whole_update() {
        let mut assets = vec![Asset::new_physical("Vault gold", PhysicalSymbol::Gold, dec!(2))];
        let outcome = apply_operation(
            &mut assets,
            &Operation::Update {
                identifier: "vault gold".to_string(),
                label: Some("Renamed".to_string()),
                quantity: Some(dec!(-1)),
                address: None,
            },
        );
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        // The label stays untouched: no partial application.
        assert_eq!(assets[0].label(), "Vault gold");
    }

    #[test]
    fn update_applies_category_appropriate_fields() {
        let mut assets = vec![Asset::new_blockchain("Hot wallet", Chain::Ethereum, "0xaaa")];
        let outcome = apply_operation(
            &mut assets,
            &Operation::Update {
                identifier: "hot wallet".to_string(),
                label: None,
                quantity: Some(dec!(5)),
                address: Some("0xbbb".to_string()),
            },
        );
        assert_eq!(outcome.status, OutcomeStatus::Applied);
        assert_eq!(outcome.detail, "Updated Hot wallet: address -> 0xbbb");
        match &assets[0] {
            Asset::Blockchain(entry) => assert_eq!(entry.address, "0xbbb"),
            _ => panic!("expected blockchain asset"),
        }
    }

    #[test]
    fn update_with_no_applicable_fields_is_skipped() {
        let mut assets = vec![Asset::new_blockchain("Hot wallet", Chain::Ethereum, "0xaaa")];
        let outcome = apply_operation(
            &mut assets,
            &Operation::Update {
                identifier: "hot wallet".to_string(),
                label: None,
                quantity: Some(dec!(5)),
                address: None,
            },
        );
        assert_eq!(outcome.status, OutcomeStatus::Skipped);
        assert_eq!(outcome.detail, "No valid fields to update");
    }

    #[test]
    fn batch_applies_in_order_against_one_working_copy() {
        let mut assets = vec![Asset::new_physical("stash", PhysicalSymbol::Gold, dec!(1))];
        let operations = vec![
            Operation::Update {
                identifier: "stash".to_string(),
                label: None,
                quantity: Some(dec!(5)),
                address: None,
            },
            Operation::Remove {
                identifier: "stash".to_string(),
            },
        ];

        let batch = apply_batch(&mut assets, &operations);
        assert!(batch.mutated);
        assert_eq!(batch.outcomes.len(), 2);
        assert!(
            batch
                .outcomes
                .iter()
                .all(|outcome| outcome.status == OutcomeStatus::Applied)
        );
        assert!(assets.is_empty());
    }

    #[test]
    fn batch_of_skips_reports_not_mutated() {
        let mut assets = Vec::new();
        let batch = apply_batch(
            &mut assets,
            &[Operation::Remove {
                identifier: "ghost".to_string(),
            }],
        );
        assert!(!batch.mutated);
        assert_eq!(batch.outcomes[0].status, OutcomeStatus::Skipped);
    }
}

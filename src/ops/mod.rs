//! Portfolio operations: wire-shape validation and outcome records.
//!
//! The planner is an untrusted producer. Its candidate operations arrive as
//! loose JSON and are reduced here to a closed tagged union; anything that
//! does not fit the union is dropped before it can reach the applier. Shape
//! validation (this module) and business rules (the applier) together form
//! the trust boundary: no operation has side effects without passing both.

pub mod apply;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::portfolio::{Chain, PhysicalSymbol};

/// A validated portfolio mutation. Transient: only its effects are persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddChain {
        chain: Chain,
        address: String,
        label: Option<String>,
    },
    AddPhysical {
        symbol: PhysicalSymbol,
        quantity: Decimal,
        label: Option<String>,
    },
    Remove {
        identifier: String,
    },
    Update {
        identifier: String,
        label: Option<String>,
        quantity: Option<Decimal>,
        address: Option<String>,
    },
}

/// Wire shape of a candidate operation as emitted by the planner.
#[derive(Debug, Deserialize)]
struct WireOperation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    quantity: Option<serde_json::Value>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    identifier: Option<String>,
}

fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(_) | serde_json::Value::String(_) => {
            serde_json::from_value(value.clone()).ok()
        }
        _ => None,
    }
}

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Operation {
    /// Structurally validate one candidate operation.
    ///
    /// Returns `None` for anything malformed; the caller drops those without
    /// recording an outcome. Business rules (positive quantities, resolvable
    /// identifiers) stay in the applier so the two failure modes remain
    /// distinguishable in the outcome detail.
    pub fn from_wire(value: &serde_json::Value) -> Option<Self> {
        let wire: WireOperation = serde_json::from_value(value.clone()).ok()?;
        match wire.kind.as_str() {
            "add" => {
                let target = wire.target?;
                if let Some(chain) = Chain::parse(&target) {
                    let address = wire.address.filter(|address| !address.is_empty())?;
                    Some(Self::AddChain {
                        chain,
                        address,
                        label: wire.label,
                    })
                } else if let Some(symbol) = PhysicalSymbol::parse(&target) {
                    let quantity = wire.quantity.as_ref().and_then(decimal_from_value)?;
                    Some(Self::AddPhysical {
                        symbol,
                        quantity,
                        label: wire.label,
                    })
                } else {
                    None
                }
            }
            "remove" => Some(Self::Remove {
                identifier: nonempty(wire.identifier)?,
            }),
            "update" => Some(Self::Update {
                identifier: nonempty(wire.identifier)?,
                label: wire.label,
                quantity: wire.quantity.as_ref().and_then(decimal_from_value),
                address: wire.address,
            }),
            _ => None,
        }
    }
}

/// Filter a raw candidate list down to shape-valid operations, in order.
pub fn parse_operations(raw: &[serde_json::Value]) -> Vec<Operation> {
    raw.iter()
        .filter_map(|candidate| {
            let operation = Operation::from_wire(candidate);
            if operation.is_none() {
                tracing::debug!(%candidate, "dropping malformed operation");
            }
            operation
        })
        .collect()
}

/// Outcome status for one operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Applied,
    Skipped,
}

/// Audit record for one shape-valid operation: same order as the input batch,
/// never dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    pub action: String,
    pub status: OutcomeStatus,
    pub detail: String,
}

impl OperationOutcome {
    pub fn applied(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: OutcomeStatus::Applied,
            detail: detail.into(),
        }
    }

    pub fn skipped(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            status: OutcomeStatus::Skipped,
            detail: detail.into(),
        }
    }
}

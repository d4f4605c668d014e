//! Obligo constraint bridge
//!
//! Translates the active contract set of a product group into tightened
//! optimizer variable bounds and penalty-adjusted sell prices:
//!
//! - `>=` raises a floor to `max(current, v)`, `<=` lowers a ceiling to
//!   `min(current, v)`, `==` fixes, `between` clamps low then high. Every
//!   branch applies `max`/`min` against the current value, so the bridge can
//!   never widen a bound and re-applying it is a no-op.
//! - Penalty-bearing clauses on sale-direction contracts are aggregated per
//!   delivery destination into a volume-weighted average rate that reduces
//!   the matching sell-price variable, capped at 10% of its pre-adjustment
//!   value.
//!
//! [`apply_checked`] refuses to run unless gate 4 passes for the product
//! group. [`apply_unchecked`] exists for what-if analysis only and must never
//! feed live decisions.

use obligo_gates::{gate4, GateContext, GateReport, SourceTimestamps};
use obligo_model::{CmpOp, Contract, Direction};
use obligo_store::ContractStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

pub mod destination;

pub use destination::{Destination, DestinationResolver, NameHeuristicResolver};

/// Optimizer variable value. The solver's input map is flat; the bridge only
/// ever adjusts `Number` entries and passes `Text` through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Number(f64),
    Text(String),
}

impl VariableValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            VariableValue::Number(n) => Some(*n),
            VariableValue::Text(_) => None,
        }
    }
}

pub type VariableMap = BTreeMap<String, VariableValue>;

/// One audited adjustment: enough to reconstruct every change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedChange {
    pub counterparty: String,
    pub clause_id: String,
    pub parameter: String,
    pub original: Option<f64>,
    pub new: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BridgeOutcome {
    pub variables: VariableMap,
    pub changes: Vec<AppliedChange>,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("gate 4 failed for product group {product_group}: {codes:?}")]
    GateFailed {
        product_group: String,
        codes: Vec<&'static str>,
        report: GateReport,
    },
}

/// Maximum share of a sell price the penalty adjustment may consume.
pub const PENALTY_CAP_FRACTION: f64 = 0.10;

/// Gated application: evaluates gate 4 over the store's view of the product
/// group and only then applies the active set to `vars`.
pub fn apply_checked(
    ctx: &GateContext,
    store: &ContractStore,
    product_group: &str,
    vars: &VariableMap,
    resolver: &dyn DestinationResolver,
    sources: &SourceTimestamps,
) -> Result<BridgeOutcome, BridgeError> {
    let all = store.contracts_for_group(product_group);
    let active = store.get_active_set(product_group);
    let report = gate4(ctx, product_group, &all, &active, sources);
    if !report.passed() {
        return Err(BridgeError::GateFailed {
            product_group: product_group.to_string(),
            codes: report.codes(),
            report,
        });
    }
    info!(product_group, active = active.len(), "gate 4 passed, applying constraints");
    Ok(apply_unchecked(&active, vars, resolver))
}

/// Ungated application for what-if analysis. Never use the result for live
/// trading decisions; it skips every promotion gate.
pub fn apply_unchecked(
    active: &[Contract],
    vars: &VariableMap,
    resolver: &dyn DestinationResolver,
) -> BridgeOutcome {
    let mut variables = vars.clone();
    let mut changes = Vec::new();

    for contract in active {
        for clause in &contract.clauses {
            tighten(&mut variables, &mut changes, contract, clause);
        }
    }
    apply_penalties(&mut variables, &mut changes, active, resolver);

    BridgeOutcome { variables, changes }
}

/// Tighten one variable from one binding clause. Missing variables are
/// created at the clause value (an absent entry has no bound to preserve).
fn tighten(
    vars: &mut VariableMap,
    changes: &mut Vec<AppliedChange>,
    contract: &Contract,
    clause: &obligo_model::Clause,
) {
    let (Some(parameter), Some(op), Some(value)) =
        (&clause.parameter, clause.operator, clause.value)
    else {
        return;
    };
    let current = vars.get(parameter).and_then(VariableValue::as_number);

    let new = match (op, current) {
        (CmpOp::Ge, Some(cur)) => cur.max(value),
        (CmpOp::Le, Some(cur)) => cur.min(value),
        (CmpOp::Eq, _) => value,
        (CmpOp::Between, Some(cur)) => {
            // Clamp low then high; validate() guarantees value_upper >= value.
            let upper = clause.value_upper.unwrap_or(value);
            cur.max(value).min(upper)
        }
        (CmpOp::Ge | CmpOp::Le | CmpOp::Between, None) => value,
    };

    if current != Some(new) {
        debug!(
            parameter = %parameter,
            clause = %clause.clause_id,
            ?current,
            new,
            "tightened variable"
        );
        changes.push(AppliedChange {
            counterparty: contract.counterparty.clone(),
            clause_id: clause.clause_id.clone(),
            parameter: parameter.clone(),
            original: current,
            new,
        });
        vars.insert(parameter.clone(), VariableValue::Number(new));
    }
}

/// Aggregate penalty exposure on sale contracts per destination and reduce
/// the matching sell-price variable by the volume-weighted average rate.
fn apply_penalties(
    vars: &mut VariableMap,
    changes: &mut Vec<AppliedChange>,
    active: &[Contract],
    resolver: &dyn DestinationResolver,
) {
    // destination -> (sum of rate*weight, sum of weight, contributors)
    let mut buckets: BTreeMap<Destination, (f64, f64, Vec<String>)> = BTreeMap::new();

    for contract in active {
        if contract.direction != Some(Direction::Sale) {
            continue;
        }
        let weight = contract
            .open_position
            .or_else(|| {
                contract
                    .clauses
                    .iter()
                    .find(|c| c.clause_id == "QUANTITY")
                    .and_then(|c| c.value)
            })
            .unwrap_or(1.0);

        for clause in &contract.clauses {
            let Some(rate) = clause.penalty_per_unit.filter(|r| *r > 0.0) else {
                continue;
            };
            match resolver.resolve(contract) {
                Some(dest) => {
                    let bucket = buckets.entry(dest).or_default();
                    bucket.0 += rate * weight;
                    bucket.1 += weight;
                    bucket.2.push(contract.counterparty.clone());
                }
                // Destination unknown: spread the exposure evenly.
                None => {
                    let split = weight / Destination::ALL.len() as f64;
                    for dest in Destination::ALL {
                        let bucket = buckets.entry(dest).or_default();
                        bucket.0 += rate * split;
                        bucket.1 += split;
                        bucket.2.push(contract.counterparty.clone());
                    }
                }
            }
        }
    }

    for (dest, (weighted_sum, weight, mut contributors)) in buckets {
        if weight <= 0.0 {
            continue;
        }
        let variable = dest.sell_variable();
        let Some(price) = vars.get(variable).and_then(VariableValue::as_number) else {
            continue;
        };
        let avg_rate = weighted_sum / weight;
        let reduction = avg_rate.min(price * PENALTY_CAP_FRACTION);
        let new = price - reduction;
        if new == price {
            continue;
        }
        contributors.sort();
        contributors.dedup();
        debug!(variable, price, avg_rate, reduction, "penalty-adjusted sell price");
        changes.push(AppliedChange {
            counterparty: contributors.join(", "),
            clause_id: "penalty_adjustment".to_string(),
            parameter: variable.to_string(),
            original: Some(price),
            new,
        });
        vars.insert(variable.to_string(), VariableValue::Number(new));
    }
}

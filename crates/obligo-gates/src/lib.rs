//! Obligo gate chain
//!
//! Four strictly additive promotion gates:
//!
//! ```text
//! 1 extraction complete ──► 2 review ready ──► 3 approved & validated ──► 4 product-group ready
//! ```
//!
//! Each gate re-evaluates every lower gate instead of trusting cached state,
//! so a gate N failure always surfaces (at least) the same blocker codes at
//! gate N+1 and correctness never depends on call order. A gate failure is a
//! first-class result carrying structured blockers, never an error: "not
//! ready yet" is the common case, not a fault.
//!
//! Gates are pure functions of their inputs (contract, registry, external
//! signals, clock). The caller supplies `now`; nothing here reads the wall
//! clock, so freshness logic is testable.

use chrono::{DateTime, Utc};
use obligo_model::{Confidence, Contract, ContractStatus, DiscrepancySeverity};
use obligo_registry::ClauseRegistry;
use obligo_validate::{validate_contract, ValidationResult, VariableRanges};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Stable blocker codes. Callers branch on these programmatically; the
/// message is for humans.
pub mod codes {
    pub const NO_CLAUSES: &str = "no_clauses";
    pub const NO_TEMPLATE: &str = "no_template";
    pub const MISSING_REQUIRED_CLAUSES: &str = "missing_required_clauses";
    pub const NUMERIC_CONFLICTS: &str = "numeric_conflicts";
    pub const SECONDARY_ERRORS: &str = "secondary_errors";
    pub const UNACKNOWLEDGED_LOW_CONFIDENCE: &str = "unacknowledged_low_confidence";
    pub const SAP_HIGH_SEVERITY_DISCREPANCIES: &str = "sap_high_severity_discrepancies";
    pub const NOT_APPROVED: &str = "not_approved";
    pub const NO_OPEN_POSITION: &str = "no_open_position";
    pub const EXPIRED: &str = "expired";
    pub const STALE_EXTERNAL_VALIDATION: &str = "stale_external_validation";
    pub const STALE_POSITION: &str = "stale_position";
    pub const NO_CONTRACTS: &str = "no_contracts";
    pub const COUNTERPARTIES_WITHOUT_ACTIVE: &str = "counterparties_without_active";
    pub const ACTIVE_CONTRACT_NOT_READY: &str = "active_contract_not_ready";
    pub const STALE_DATA_FLAG: &str = "stale_data_flag";
    pub const EXTERNAL_SOURCE_STALE: &str = "external_source_stale";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateLevel {
    ExtractionComplete,
    ReviewReady,
    ApprovedValidated,
    ProductGroupReady,
}

impl std::fmt::Display for GateLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateLevel::ExtractionComplete => "gate_1_extraction_complete",
            GateLevel::ReviewReady => "gate_2_review_ready",
            GateLevel::ApprovedValidated => "gate_3_approved_validated",
            GateLevel::ProductGroupReady => "gate_4_product_group_ready",
        };
        f.write_str(s)
    }
}

/// One itemized blocking reason.
#[derive(Debug, Clone, Serialize)]
pub struct Blocker {
    pub gate: GateLevel,
    pub code: &'static str,
    pub message: String,
    pub detail: serde_json::Value,
}

/// Gate outcome: pass with a details map or fail with ordered blockers.
/// Never a bare boolean.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GateReport {
    Pass {
        details: BTreeMap<String, serde_json::Value>,
    },
    Fail {
        blockers: Vec<Blocker>,
    },
}

impl GateReport {
    pub fn passed(&self) -> bool {
        matches!(self, GateReport::Pass { .. })
    }

    pub fn blockers(&self) -> &[Blocker] {
        match self {
            GateReport::Pass { .. } => &[],
            GateReport::Fail { blockers } => blockers,
        }
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.blockers().iter().map(|b| b.code).collect()
    }

    fn from_blockers(blockers: Vec<Blocker>, details: BTreeMap<String, serde_json::Value>) -> Self {
        if blockers.is_empty() {
            GateReport::Pass { details }
        } else {
            GateReport::Fail { blockers }
        }
    }
}

/// Freshness thresholds, all in minutes. `sources` names each external feed
/// gate 4 watches (price index, position feed, ...).
#[derive(Debug, Clone, Serialize)]
pub struct FreshnessPolicy {
    pub external_validation_max_age_min: i64,
    pub position_max_age_min: i64,
    pub sources: BTreeMap<String, i64>,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            external_validation_max_age_min: 24 * 60,
            position_max_age_min: 24 * 60,
            sources: BTreeMap::new(),
        }
    }
}

/// Last-refresh timestamps of the named external sources, as observed by the
/// caller.
pub type SourceTimestamps = BTreeMap<String, DateTime<Utc>>;

/// Shared evaluation inputs. The clock is injected, never read.
pub struct GateContext<'a> {
    pub registry: &'a ClauseRegistry,
    pub ranges: &'a VariableRanges,
    pub freshness: &'a FreshnessPolicy,
    pub now: DateTime<Utc>,
}

impl<'a> GateContext<'a> {
    fn is_stale(&self, stamp: Option<DateTime<Utc>>, max_age_min: i64) -> bool {
        match stamp {
            Some(at) => (self.now - at).num_minutes() > max_age_min,
            None => true,
        }
    }
}

fn blocker(
    gate: GateLevel,
    code: &'static str,
    message: impl Into<String>,
    detail: serde_json::Value,
) -> Blocker {
    Blocker {
        gate,
        code,
        message: message.into(),
        detail,
    }
}

// ============================================================================
// Gate 1: extraction complete
// ============================================================================

/// Gate 1: the contract has clauses, a template/direction, no missing
/// required clauses, and no unresolved numeric conflicts. Pass makes it
/// eligible for submission to review.
pub fn gate1(ctx: &GateContext, contract: &Contract) -> GateReport {
    let gate = GateLevel::ExtractionComplete;
    let mut blockers = Vec::new();
    let mut details = BTreeMap::new();

    if contract.clauses.is_empty() {
        blockers.push(blocker(
            gate,
            codes::NO_CLAUSES,
            "no clauses were extracted from this contract",
            serde_json::Value::Null,
        ));
    }
    if contract.template_type.is_none() && contract.direction.is_none() {
        blockers.push(blocker(
            gate,
            codes::NO_TEMPLATE,
            "no template or direction is assigned",
            serde_json::Value::Null,
        ));
    }

    match validate_contract(ctx.registry, contract, ctx.ranges) {
        Ok(validation) => {
            append_validation_blockers(gate, &validation, &mut blockers);
            details.insert(
                "completeness_pct".to_string(),
                serde_json::json!(validation.completeness_pct),
            );
            details.insert(
                "family_id".to_string(),
                serde_json::json!(validation.family_id),
            );
        }
        Err(e) => blockers.push(blocker(
            gate,
            codes::NO_TEMPLATE,
            format!("contract family cannot be resolved: {e}"),
            serde_json::Value::Null,
        )),
    }

    details.insert(
        "clause_count".to_string(),
        serde_json::json!(contract.clauses.len()),
    );
    debug!(contract = %contract.id, blockers = blockers.len(), "gate 1 evaluated");
    GateReport::from_blockers(blockers, details)
}

fn append_validation_blockers(
    gate: GateLevel,
    validation: &ValidationResult,
    blockers: &mut Vec<Blocker>,
) {
    let missing = validation.missing_required();
    if !missing.is_empty() {
        blockers.push(blocker(
            gate,
            codes::MISSING_REQUIRED_CLAUSES,
            format!("{} required clause(s) missing", missing.len()),
            serde_json::json!(missing),
        ));
    }
    let conflicts = validation.numeric_conflicts();
    if !conflicts.is_empty() {
        blockers.push(blocker(
            gate,
            codes::NUMERIC_CONFLICTS,
            format!("{} numeric conflict(s) between clauses", conflicts.len()),
            serde_json::to_value(&conflicts).unwrap_or(serde_json::Value::Null),
        ));
    }
}

// ============================================================================
// Gate 2: review ready
// ============================================================================

/// Gate 2: gate 1 plus secondary verification clean, every low-confidence
/// clause acknowledged by a reviewer, and no high-severity external
/// discrepancy. Pass makes it eligible for legal approval.
pub fn gate2(ctx: &GateContext, contract: &Contract) -> GateReport {
    let gate = GateLevel::ReviewReady;
    let lower = gate1(ctx, contract);
    let mut blockers = lower.blockers().to_vec();
    let mut details = match &lower {
        GateReport::Pass { details } => details.clone(),
        GateReport::Fail { .. } => BTreeMap::new(),
    };

    if let Some(review) = &contract.secondary_review {
        let errors = review.error_count();
        if errors > 0 {
            blockers.push(blocker(
                gate,
                codes::SECONDARY_ERRORS,
                format!("secondary verification reported {errors} error(s)"),
                serde_json::json!(errors),
            ));
        }
    }

    let unacknowledged: Vec<&str> = contract
        .clauses
        .iter()
        .filter(|c| c.confidence == Confidence::Low && c.review_note.is_none())
        .map(|c| c.clause_id.as_str())
        .collect();
    if !unacknowledged.is_empty() {
        blockers.push(blocker(
            gate,
            codes::UNACKNOWLEDGED_LOW_CONFIDENCE,
            format!(
                "{} low-confidence clause(s) lack reviewer acknowledgment",
                unacknowledged.len()
            ),
            serde_json::json!(unacknowledged),
        ));
    }

    let high: Vec<&str> = contract
        .discrepancies
        .iter()
        .filter(|d| d.severity == DiscrepancySeverity::High)
        .map(|d| d.field.as_str())
        .collect();
    if !high.is_empty() {
        blockers.push(blocker(
            gate,
            codes::SAP_HIGH_SEVERITY_DISCREPANCIES,
            format!("{} high-severity external discrepanc(ies)", high.len()),
            serde_json::json!(high),
        ));
    }

    details.insert(
        "discrepancy_count".to_string(),
        serde_json::json!(contract.discrepancies.len()),
    );
    GateReport::from_blockers(blockers, details)
}

// ============================================================================
// Gate 3: approved & validated
// ============================================================================

/// Gate 3: gate 2 plus approved status, a known open position, not expired,
/// and fresh external-validation / position timestamps. Pass makes the
/// contract eligible for activation in optimizer input.
pub fn gate3(ctx: &GateContext, contract: &Contract) -> GateReport {
    let gate = GateLevel::ApprovedValidated;
    let lower = gate2(ctx, contract);
    let mut blockers = lower.blockers().to_vec();
    let mut details = match &lower {
        GateReport::Pass { details } => details.clone(),
        GateReport::Fail { .. } => BTreeMap::new(),
    };

    if contract.status != ContractStatus::Approved {
        blockers.push(blocker(
            gate,
            codes::NOT_APPROVED,
            format!("contract status is {}, not approved", contract.status),
            serde_json::json!(contract.status),
        ));
    }
    if contract.open_position.is_none() {
        blockers.push(blocker(
            gate,
            codes::NO_OPEN_POSITION,
            "open position has not been loaded",
            serde_json::Value::Null,
        ));
    }
    if contract.is_expired(ctx.now.date_naive()) {
        blockers.push(blocker(
            gate,
            codes::EXPIRED,
            "contract expiry date is in the past",
            serde_json::json!(contract.expiry_date),
        ));
    }
    if ctx.is_stale(
        contract.external_validated_at,
        ctx.freshness.external_validation_max_age_min,
    ) {
        blockers.push(blocker(
            gate,
            codes::STALE_EXTERNAL_VALIDATION,
            "external validation is missing or older than its max age",
            serde_json::json!(contract.external_validated_at),
        ));
    }
    if ctx.is_stale(
        contract.position_refreshed_at,
        ctx.freshness.position_max_age_min,
    ) {
        blockers.push(blocker(
            gate,
            codes::STALE_POSITION,
            "open position is missing or older than its max age",
            serde_json::json!(contract.position_refreshed_at),
        ));
    }

    details.insert("status".to_string(), serde_json::json!(contract.status));
    GateReport::from_blockers(blockers, details)
}

// ============================================================================
// Gate 4: product-group ready (master gate)
// ============================================================================

/// Gate 4 over a whole product group: at least one contract, every
/// counterparty covered by an active contract, every active contract passing
/// gate 3, no stale-data flags, and every named external source fresh.
///
/// `all` is every non-deleted contract in the group; `active` the current
/// active set. Per-contract gate 3 blockers are carried through so a lower
/// failure is always visible here.
pub fn gate4(
    ctx: &GateContext,
    product_group: &str,
    all: &[Contract],
    active: &[Contract],
    sources: &SourceTimestamps,
) -> GateReport {
    let gate = GateLevel::ProductGroupReady;
    let mut blockers = Vec::new();
    let mut details = BTreeMap::new();

    if all.is_empty() {
        blockers.push(blocker(
            gate,
            codes::NO_CONTRACTS,
            format!("product group {product_group} has no contracts"),
            serde_json::Value::Null,
        ));
    }

    let mut uncovered: Vec<String> = all
        .iter()
        .map(|c| c.identity().counterparty_key)
        .filter(|key| {
            !active
                .iter()
                .any(|a| a.identity().counterparty_key == *key)
        })
        .collect();
    uncovered.sort();
    uncovered.dedup();
    if !uncovered.is_empty() {
        blockers.push(blocker(
            gate,
            codes::COUNTERPARTIES_WITHOUT_ACTIVE,
            format!("{} counterpart(ies) have no active contract", uncovered.len()),
            serde_json::json!(uncovered),
        ));
    }

    for contract in active {
        let report = gate3(ctx, contract);
        if !report.passed() {
            // Carry the underlying blockers so lower-gate failures stay
            // visible at this level, then summarize.
            blockers.extend(report.blockers().iter().cloned());
            blockers.push(blocker(
                gate,
                codes::ACTIVE_CONTRACT_NOT_READY,
                format!(
                    "active contract for {} fails gate 3",
                    contract.counterparty
                ),
                serde_json::json!({
                    "contract_id": contract.id,
                    "codes": report.codes(),
                }),
            ));
        }
    }

    let flagged: Vec<&str> = all
        .iter()
        .filter(|c| c.stale_data)
        .map(|c| c.counterparty.as_str())
        .collect();
    if !flagged.is_empty() {
        blockers.push(blocker(
            gate,
            codes::STALE_DATA_FLAG,
            format!("{} contract(s) carry a stale-data flag", flagged.len()),
            serde_json::json!(flagged),
        ));
    }

    for (source, max_age_min) in &ctx.freshness.sources {
        if ctx.is_stale(sources.get(source).copied(), *max_age_min) {
            blockers.push(blocker(
                gate,
                codes::EXTERNAL_SOURCE_STALE,
                format!("external source {source} exceeds its max age of {max_age_min} minutes"),
                serde_json::json!(source),
            ));
        }
    }

    details.insert("contract_count".to_string(), serde_json::json!(all.len()));
    details.insert("active_count".to_string(), serde_json::json!(active.len()));
    details.insert(
        "product_group".to_string(),
        serde_json::json!(product_group),
    );
    GateReport::from_blockers(blockers, details)
}

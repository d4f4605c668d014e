//! Contract records and the review state machine.

use crate::clause::Clause;
use crate::normalize_counterparty;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type ContractId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyType {
    Customer,
    Supplier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Purchase,
    Sale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermType {
    Spot,
    LongTerm,
}

/// Review lifecycle state.
///
/// `Superseded` is applied by the store when a newer contract for the same
/// identity is approved; it is not reachable through reviewer actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Superseded,
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContractStatus::Draft => "draft",
            ContractStatus::PendingReview => "pending_review",
            ContractStatus::Approved => "approved",
            ContractStatus::Rejected => "rejected",
            ContractStatus::Superseded => "superseded",
        };
        f.write_str(s)
    }
}

/// The legal reviewer-driven transitions, as a table so additions are a
/// one-line change and the whole machine is auditable at a glance.
pub const LEGAL_TRANSITIONS: &[(ContractStatus, ContractStatus)] = &[
    (ContractStatus::Draft, ContractStatus::PendingReview),
    (ContractStatus::PendingReview, ContractStatus::Approved),
    (ContractStatus::PendingReview, ContractStatus::Rejected),
    (ContractStatus::Rejected, ContractStatus::PendingReview),
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal contract status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: ContractStatus,
    pub to: ContractStatus,
}

impl ContractStatus {
    /// Validate a reviewer-driven transition against [`LEGAL_TRANSITIONS`].
    pub fn check_transition(self, to: ContractStatus) -> Result<(), TransitionError> {
        if LEGAL_TRANSITIONS.contains(&(self, to)) {
            Ok(())
        } else {
            Err(TransitionError { from: self, to })
        }
    }
}

/// Identity of a contract: the pair the active-contract invariant is enforced
/// over. Counterparty names are normalized so spelling variants collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractIdentity {
    pub counterparty_key: String,
    pub product_group: String,
}

impl ContractIdentity {
    pub fn new(counterparty: &str, product_group: &str) -> Self {
        Self {
            counterparty_key: normalize_counterparty(counterparty),
            product_group: product_group.to_string(),
        }
    }
}

/// Severity of an external-system (SAP-equivalent) discrepancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancySeverity {
    Low,
    Medium,
    High,
}

/// One field-level difference between extracted values and the external
/// system of record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub field: String,
    pub severity: DiscrepancySeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sap_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSeverity {
    Info,
    Warning,
    Error,
}

/// Finding from the secondary (LLM-or-equivalent) verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryFinding {
    pub severity: ReviewSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause_id: Option<String>,
}

/// Secondary verification result, attached when the pass has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryReview {
    pub findings: Vec<SecondaryFinding>,
    pub reviewed_at: DateTime<Utc>,
}

impl SecondaryReview {
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == ReviewSeverity::Error)
            .count()
    }
}

/// A versioned contract: the unit the store, gates, and bridge operate on.
///
/// Contracts are never physically deleted. Superseded and soft-deleted
/// versions stay in the store for audit; `previous_version_hash` chains each
/// version to the document it replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub counterparty: String,
    pub counterparty_type: CounterpartyType,
    pub product_group: String,
    /// Contract template, e.g. `sale_cfr_longterm`. Assigned by extraction or
    /// the external payload; gate 1 requires it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoterm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_type: Option<TermType>,
    /// Owning company entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    /// Monotonically increasing per identity; assigned at ingestion.
    pub version: u32,
    pub status: ContractStatus,
    pub clauses: Vec<Clause>,
    /// Completeness validation blob (audit copy; gates re-run the validator).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completeness_validation: Option<serde_json::Value>,
    /// External-system validation blob (audit copy).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_validation: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_review: Option<SecondaryReview>,
    /// External system-of-record reference (SAP contract id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
    /// Outstanding undelivered quantity, sourced externally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_position: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_refreshed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_validated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    /// Hash of the previous version's document; forms the audit chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_hash: Option<String>,
    /// Set externally when upstream data for this contract is known stale.
    #[serde(default)]
    pub stale_data: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// New draft with no version assigned yet (the store assigns it).
    pub fn draft(
        counterparty: impl Into<String>,
        counterparty_type: CounterpartyType,
        product_group: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            counterparty: counterparty.into(),
            counterparty_type,
            product_group: product_group.into(),
            template_type: None,
            direction: None,
            incoterm: None,
            term_type: None,
            company: None,
            contract_number: None,
            family_id: None,
            effective_date: None,
            expiry_date: None,
            version: 0,
            status: ContractStatus::Draft,
            clauses: Vec::new(),
            completeness_validation: None,
            external_validation: None,
            secondary_review: None,
            external_ref: None,
            discrepancies: Vec::new(),
            open_position: None,
            position_refreshed_at: None,
            external_validated_at: None,
            document_hash: None,
            document_size: None,
            source_path: None,
            previous_version_hash: None,
            stale_data: false,
            deleted: false,
            delete_reason: None,
            reviewer: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity(&self) -> ContractIdentity {
        ContractIdentity::new(&self.counterparty, &self.product_group)
    }

    /// Expired iff an expiry date is set and lies strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|d| d < today).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions_accepted() {
        use ContractStatus::*;
        assert!(Draft.check_transition(PendingReview).is_ok());
        assert!(PendingReview.check_transition(Approved).is_ok());
        assert!(PendingReview.check_transition(Rejected).is_ok());
        assert!(Rejected.check_transition(PendingReview).is_ok());
    }

    #[test]
    fn every_other_transition_rejected_with_pair() {
        use ContractStatus::*;
        let all = [Draft, PendingReview, Approved, Rejected, Superseded];
        for from in all {
            for to in all {
                let legal = LEGAL_TRANSITIONS.contains(&(from, to));
                match from.check_transition(to) {
                    Ok(()) => assert!(legal, "{from} -> {to} should have been rejected"),
                    Err(e) => {
                        assert!(!legal);
                        assert_eq!(e.from, from);
                        assert_eq!(e.to, to);
                    }
                }
            }
        }
    }

    #[test]
    fn identity_collapses_counterparty_spelling() {
        let a = ContractIdentity::new("CF  Industries", "ammonia");
        let b = ContractIdentity::new("cf industries", "ammonia");
        assert_eq!(a, b);
    }

    #[test]
    fn expiry_is_strictly_past() {
        let mut c = Contract::draft("Koch", CounterpartyType::Customer, "ammonia");
        let today = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert!(!c.is_expired(today));
        c.expiry_date = Some(today);
        assert!(!c.is_expired(today));
        c.expiry_date = Some(today.pred_opt().unwrap());
        assert!(c.is_expired(today));
    }
}

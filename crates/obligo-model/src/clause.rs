//! Clause records: one extracted contractual provision each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Closed set of clause types.
///
/// This mirrors how trading desks talk about provisions; extraction rules map
/// each canonical clause id to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseType {
    Obligation,
    Penalty,
    Condition,
    PriceTerm,
    Limit,
    Delivery,
    Metadata,
    Legal,
    Compliance,
    Operational,
}

/// Clause category, used to default a clause's requirement level within a
/// contract family (core/commercial/... ⇒ required, operational/... ⇒ expected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseCategory {
    Core,
    Commercial,
    Logistics,
    Determination,
    Risk,
    Credit,
    Operational,
    Compliance,
    Documentation,
    RiskAllocation,
    Legal,
}

impl ClauseCategory {
    /// Categories that default to `required` when a family expects the clause.
    pub fn defaults_to_required(self) -> bool {
        matches!(
            self,
            ClauseCategory::Core
                | ClauseCategory::Commercial
                | ClauseCategory::Logistics
                | ClauseCategory::Determination
                | ClauseCategory::Risk
                | ClauseCategory::Credit
        )
    }
}

/// Comparison operator tying a clause to a solver variable bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// Floor: the variable must stay at or above the clause value.
    Ge,
    /// Ceiling: the variable must stay at or below the clause value.
    Le,
    /// Fixed value.
    Eq,
    /// Closed interval `[value, value_upper]`.
    Between,
}

/// Extraction confidence. Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// One extracted contractual provision.
///
/// `description` is the verbatim source span so a reviewer can always see what
/// the extractor saw. A clause with a `parameter` but no `operator` is
/// informational only: it names a solver variable without constraining it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    /// Canonical clause identifier (e.g. `PRICE`, `QUANTITY_TOLERANCE`).
    /// Unmatched fragments are dropped at the extraction boundary, so this is
    /// never empty inside the pipeline.
    pub clause_id: String,
    pub clause_type: ClauseType,
    pub category: ClauseCategory,
    /// Verbatim source span the clause was extracted from.
    pub description: String,
    /// Solver parameter key this clause constrains, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<CmpOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Upper bound, present iff `operator` is `Between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_upper: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Penalty rate per unit of shortfall/violation, if penalty-bearing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_cap: Option<f64>,
    /// Recurrence period (e.g. `per_month`), if the obligation repeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Section reference within the source document (e.g. `sec_4.2`).
    pub section_ref: String,
    pub confidence: Confidence,
    /// Anchor strings that matched during detection.
    pub matched_anchors: Vec<String>,
    /// Free-form named sub-values captured during field extraction.
    #[serde(default)]
    pub extracted_fields: HashMap<String, String>,
    /// Reviewer acknowledgment. Gate 2 requires this to be non-null for every
    /// low-confidence clause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClauseInvariantError {
    #[error("clause {clause_id}: operator `between` requires both value and value_upper")]
    IncompleteBetween { clause_id: String },
    #[error("clause {clause_id}: value_upper {upper} is below value {lower}")]
    InvertedBetween {
        clause_id: String,
        lower: String,
        upper: String,
    },
}

impl Clause {
    /// Minimal constructor; extraction and the LLM payload path fill the rest.
    pub fn new(
        clause_id: impl Into<String>,
        clause_type: ClauseType,
        category: ClauseCategory,
        description: impl Into<String>,
        section_ref: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        Self {
            clause_id: clause_id.into(),
            clause_type,
            category,
            description: description.into(),
            parameter: None,
            operator: None,
            value: None,
            value_upper: None,
            unit: None,
            penalty_per_unit: None,
            penalty_cap: None,
            period: None,
            section_ref: section_ref.into(),
            confidence,
            matched_anchors: Vec::new(),
            extracted_fields: HashMap::new(),
            review_note: None,
            created_at: Utc::now(),
        }
    }

    /// Check structural invariants: a `between` operator carries both bounds,
    /// in order.
    pub fn validate(&self) -> Result<(), ClauseInvariantError> {
        if self.operator == Some(CmpOp::Between) {
            match (self.value, self.value_upper) {
                (Some(lo), Some(hi)) => {
                    if hi < lo {
                        return Err(ClauseInvariantError::InvertedBetween {
                            clause_id: self.clause_id.clone(),
                            lower: lo.to_string(),
                            upper: hi.to_string(),
                        });
                    }
                }
                _ => {
                    return Err(ClauseInvariantError::IncompleteBetween {
                        clause_id: self.clause_id.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    /// True if this clause can drive a solver bound: it names a parameter, an
    /// operator, and a value.
    pub fn is_binding(&self) -> bool {
        self.parameter.is_some() && self.operator.is_some() && self.value.is_some()
    }

    /// True if this clause carries penalty exposure.
    pub fn is_penalty_bearing(&self) -> bool {
        self.penalty_per_unit.map(|r| r > 0.0).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(op: Option<CmpOp>, value: Option<f64>, upper: Option<f64>) -> Clause {
        let mut c = Clause::new(
            "QUANTITY_TOLERANCE",
            ClauseType::Limit,
            ClauseCategory::Commercial,
            "Quantity tolerance +/- 5% at seller's option",
            "sec_1",
            Confidence::High,
        );
        c.operator = op;
        c.value = value;
        c.value_upper = upper;
        c
    }

    #[test]
    fn between_requires_both_bounds() {
        let c = clause(Some(CmpOp::Between), Some(4750.0), None);
        assert_eq!(
            c.validate(),
            Err(ClauseInvariantError::IncompleteBetween {
                clause_id: "QUANTITY_TOLERANCE".to_string()
            })
        );
        assert!(clause(Some(CmpOp::Between), Some(4750.0), Some(5250.0))
            .validate()
            .is_ok());
    }

    #[test]
    fn between_rejects_inverted_bounds() {
        let c = clause(Some(CmpOp::Between), Some(5250.0), Some(4750.0));
        assert!(c.validate().is_err());
    }

    #[test]
    fn informational_clause_is_valid_but_not_binding() {
        let mut c = clause(None, None, None);
        c.parameter = Some("open_stl".to_string());
        assert!(c.validate().is_ok());
        assert!(!c.is_binding());
    }

    #[test]
    fn confidence_ordering() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
    }
}

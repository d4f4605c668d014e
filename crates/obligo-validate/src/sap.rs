//! External-record (SAP-equivalent) comparison.
//!
//! The external system of record is retrieved elsewhere; this module only
//! compares a normalized snapshot of it against a contract's extracted values
//! and emits field-level discrepancies. Severity drives gate 2: any `high`
//! discrepancy blocks review-readiness.

use chrono::NaiveDate;
use obligo_model::{normalize_counterparty, Contract, Discrepancy, DiscrepancySeverity};
use serde::{Deserialize, Serialize};

/// Normalized external record for one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub counterparty: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
}

/// Relative difference bands for numeric fields: within 1% is agreement,
/// within 10% is worth a look, beyond that the extraction or the external
/// record is wrong.
fn numeric_severity(contract_value: f64, sap_value: f64) -> Option<DiscrepancySeverity> {
    let base = sap_value.abs().max(f64::EPSILON);
    let rel = (contract_value - sap_value).abs() / base;
    if rel <= 0.01 {
        None
    } else if rel <= 0.10 {
        Some(DiscrepancySeverity::Medium)
    } else {
        Some(DiscrepancySeverity::High)
    }
}

fn clause_value(contract: &Contract, clause_id: &str) -> Option<f64> {
    contract
        .clauses
        .iter()
        .find(|c| c.clause_id == clause_id)
        .and_then(|c| c.value)
}

/// Compare a contract against its external record.
pub fn compare(contract: &Contract, record: &ExternalRecord) -> Vec<Discrepancy> {
    let mut out = Vec::new();

    if normalize_counterparty(&contract.counterparty) != normalize_counterparty(&record.counterparty)
    {
        out.push(Discrepancy {
            field: "counterparty".to_string(),
            severity: DiscrepancySeverity::High,
            message: "counterparty identity differs from the external record".to_string(),
            contract_value: Some(contract.counterparty.clone()),
            sap_value: Some(record.counterparty.clone()),
        });
    }

    if let (Some(extracted), Some(external)) = (clause_value(contract, "QUANTITY"), record.quantity)
    {
        if let Some(severity) = numeric_severity(extracted, external) {
            out.push(Discrepancy {
                field: "quantity".to_string(),
                severity,
                message: format!("extracted quantity {extracted} vs external {external}"),
                contract_value: Some(extracted.to_string()),
                sap_value: Some(external.to_string()),
            });
        }
    }

    if let (Some(extracted), Some(external)) = (clause_value(contract, "PRICE"), record.price) {
        if let Some(severity) = numeric_severity(extracted, external) {
            out.push(Discrepancy {
                field: "price".to_string(),
                severity,
                message: format!("extracted price {extracted} vs external {external}"),
                contract_value: Some(extracted.to_string()),
                sap_value: Some(external.to_string()),
            });
        }
    }

    if let (Some(contract_date), Some(external_date)) = (contract.effective_date, record.valid_from)
    {
        if contract_date != external_date {
            out.push(Discrepancy {
                field: "effective_date".to_string(),
                severity: DiscrepancySeverity::Medium,
                message: "effective date differs from external validity start".to_string(),
                contract_value: Some(contract_date.to_string()),
                sap_value: Some(external_date.to_string()),
            });
        }
    }
    if let (Some(contract_date), Some(external_date)) = (contract.expiry_date, record.valid_to) {
        if contract_date != external_date {
            out.push(Discrepancy {
                field: "expiry_date".to_string(),
                severity: DiscrepancySeverity::Medium,
                message: "expiry date differs from external validity end".to_string(),
                contract_value: Some(contract_date.to_string()),
                sap_value: Some(external_date.to_string()),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use obligo_model::{Clause, ClauseCategory, ClauseType, CmpOp, Confidence, CounterpartyType};

    fn contract() -> Contract {
        let mut c = Contract::draft("CF Industries", CounterpartyType::Customer, "ammonia");
        let mut quantity = Clause::new(
            "QUANTITY",
            ClauseType::Obligation,
            ClauseCategory::Core,
            "Total quantity of 60,000 MT per year",
            "sec_3",
            Confidence::High,
        );
        quantity.parameter = Some("contract_quantity".to_string());
        quantity.operator = Some(CmpOp::Le);
        quantity.value = Some(60000.0);
        let mut price = Clause::new(
            "PRICE",
            ClauseType::PriceTerm,
            ClauseCategory::Commercial,
            "USD 400 per metric ton",
            "sec_4",
            Confidence::High,
        );
        price.parameter = Some("nh3_price".to_string());
        price.operator = Some(CmpOp::Eq);
        price.value = Some(400.0);
        c.clauses = vec![quantity, price];
        c.effective_date = NaiveDate::from_ymd_opt(2026, 1, 1);
        c.expiry_date = NaiveDate::from_ymd_opt(2026, 12, 31);
        c
    }

    fn matching_record() -> ExternalRecord {
        ExternalRecord {
            counterparty: "cf industries".to_string(),
            quantity: Some(60000.0),
            price: Some(400.0),
            valid_from: NaiveDate::from_ymd_opt(2026, 1, 1),
            valid_to: NaiveDate::from_ymd_opt(2026, 12, 31),
        }
    }

    #[test]
    fn matching_record_has_no_discrepancies() {
        assert!(compare(&contract(), &matching_record()).is_empty());
    }

    #[test]
    fn counterparty_mismatch_is_high() {
        let mut record = matching_record();
        record.counterparty = "Koch Fertilizer".to_string();
        let ds = compare(&contract(), &record);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].field, "counterparty");
        assert_eq!(ds[0].severity, DiscrepancySeverity::High);
    }

    #[test]
    fn numeric_severity_bands() {
        let mut record = matching_record();
        record.quantity = Some(63000.0); // 5% off
        record.price = Some(500.0); // 25% off
        let ds = compare(&contract(), &record);
        let sev = |field: &str| ds.iter().find(|d| d.field == field).unwrap().severity;
        assert_eq!(sev("quantity"), DiscrepancySeverity::Medium);
        assert_eq!(sev("price"), DiscrepancySeverity::High);
    }

    #[test]
    fn date_mismatch_is_medium() {
        let mut record = matching_record();
        record.valid_to = NaiveDate::from_ymd_opt(2027, 6, 30);
        let ds = compare(&contract(), &record);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds[0].field, "expiry_date");
        assert_eq!(ds[0].severity, DiscrepancySeverity::Medium);
    }
}

//! External (LLM-or-equivalent) extraction path.
//!
//! The external extractor produces the same clause shape as the deterministic
//! engine, so both paths are interchangeable inputs to validation, gating,
//! and bridging. This module owns:
//!
//! - the payload schema and its parsing (malformed payloads are typed input
//!   errors, never silently defaulted),
//! - provider configuration from the environment,
//! - the service client (behind the `llm` feature), with failures
//!   distinguished as unreachable / missing config / bad response shape /
//!   timeout,
//! - deterministic fallback when the service path fails.

use chrono::{NaiveDate, Utc};
use obligo_model::{
    Clause, ClauseCategory, ClauseInvariantError, ClauseType, CmpOp, Confidence, Contract,
    CounterpartyType, Direction, TermType,
};
use obligo_registry::ClauseRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const PAYLOAD_VERSION: &str = "1";

/// One clause as produced by the external extractor. `clause_id: null` marks
/// an unmatched fragment; those are dropped at this boundary rather than
/// carried as partial clauses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmClause {
    pub clause_id: Option<String>,
    pub category: ClauseCategory,
    #[serde(default)]
    pub extracted_fields: HashMap<String, String>,
    pub source_text: String,
    pub section_ref: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub operator: Option<CmpOp>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub value_upper: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub penalty_per_unit: Option<f64>,
    #[serde(default)]
    pub penalty_cap: Option<f64>,
    #[serde(default)]
    pub period: Option<String>,
}

/// The full extraction payload from the external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPayload {
    pub clauses: Vec<LlmClause>,
    pub counterparty: String,
    pub counterparty_type: CounterpartyType,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub incoterm: Option<String>,
    #[serde(default)]
    pub term_type: Option<TermType>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub family_id: Option<String>,
    #[serde(default)]
    pub contract_number: Option<String>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed extraction payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("extraction payload contained no usable clauses")]
    NoClauses,
    #[error("clause invariant violated in payload: {0}")]
    Invariant(#[from] ClauseInvariantError),
}

/// Parse and check the external payload, dropping null-id fragments.
pub fn parse_payload(
    registry: &ClauseRegistry,
    json: &str,
) -> Result<(Vec<Clause>, LlmPayload), PayloadError> {
    let payload: LlmPayload = serde_json::from_str(json)?;
    let clauses = payload_clauses(registry, &payload)?;
    if clauses.is_empty() {
        return Err(PayloadError::NoClauses);
    }
    Ok((clauses, payload))
}

fn payload_clauses(
    registry: &ClauseRegistry,
    payload: &LlmPayload,
) -> Result<Vec<Clause>, PayloadError> {
    let mut out = Vec::new();
    for lc in &payload.clauses {
        let Some(clause_id) = lc.clause_id.clone() else {
            continue; // unmatched fragment: dropped, not partial
        };
        let clause_type = registry
            .definition(&clause_id)
            .map(|d| d.clause_type)
            .unwrap_or_else(|_| type_for_category(lc.category));
        let mut clause = Clause::new(
            clause_id,
            clause_type,
            lc.category,
            lc.source_text.clone(),
            lc.section_ref.clone(),
            lc.confidence,
        );
        clause.parameter = lc.parameter.clone();
        clause.operator = lc.operator;
        clause.value = lc.value;
        clause.value_upper = lc.value_upper;
        clause.unit = lc.unit.clone();
        clause.penalty_per_unit = lc.penalty_per_unit;
        clause.penalty_cap = lc.penalty_cap;
        clause.period = lc.period.clone();
        clause.extracted_fields = lc.extracted_fields.clone();
        clause.validate()?;
        out.push(clause);
    }
    Ok(out)
}

/// Category fallback when the payload names a clause id the registry has not
/// seen yet.
fn type_for_category(category: ClauseCategory) -> ClauseType {
    match category {
        ClauseCategory::Core | ClauseCategory::Commercial => ClauseType::Obligation,
        ClauseCategory::Determination => ClauseType::Condition,
        ClauseCategory::Logistics => ClauseType::Delivery,
        ClauseCategory::Risk => ClauseType::Penalty,
        ClauseCategory::Credit => ClauseType::Condition,
        ClauseCategory::Compliance => ClauseType::Compliance,
        ClauseCategory::Legal | ClauseCategory::RiskAllocation => ClauseType::Legal,
        ClauseCategory::Documentation => ClauseType::Metadata,
        ClauseCategory::Operational => ClauseType::Operational,
    }
}

/// Assemble a draft [`Contract`] from a parsed payload. The store assigns id
/// and version at ingestion.
pub fn payload_to_contract(clauses: Vec<Clause>, payload: &LlmPayload) -> Contract {
    let mut contract = Contract::draft(
        payload.counterparty.clone(),
        payload.counterparty_type,
        // Product group resolution stays with the caller; default to the
        // family's product prefix when present.
        payload
            .family_id
            .as_deref()
            .and_then(|f| f.split('_').next())
            .unwrap_or("unassigned")
            .to_string(),
    );
    contract.direction = payload.direction;
    contract.incoterm = payload.incoterm.clone();
    contract.term_type = payload.term_type;
    contract.company = payload.company.clone();
    contract.effective_date = payload.effective_date;
    contract.expiry_date = payload.expiry_date;
    contract.family_id = payload.family_id.clone();
    contract.contract_number = payload.contract_number.clone();
    contract.template_type = payload.family_id.clone();
    contract.clauses = clauses;
    contract.updated_at = Utc::now();
    contract
}

// ============================================================================
// Service configuration and client
// ============================================================================

/// Typed failure of the external extraction path. Callers fall back to the
/// deterministic engine where the path is optional.
#[derive(Debug, Error)]
pub enum ExtractServiceError {
    #[error("extraction service not configured: {0}")]
    MissingConfig(String),
    #[error("extraction service unreachable: {0}")]
    Unreachable(String),
    #[error("extraction service returned a bad response shape: {0}")]
    BadResponseShape(String),
    #[error("extraction service timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Extraction service configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ExtractServiceError> {
        let endpoint = std::env::var("OBLIGO_EXTRACT_URL").map_err(|_| {
            ExtractServiceError::MissingConfig("OBLIGO_EXTRACT_URL not set".to_string())
        })?;
        let api_key = std::env::var("OBLIGO_EXTRACT_API_KEY").map_err(|_| {
            ExtractServiceError::MissingConfig("OBLIGO_EXTRACT_API_KEY not set".to_string())
        })?;
        Ok(Self {
            endpoint,
            api_key,
            model: std::env::var("OBLIGO_EXTRACT_MODEL")
                .unwrap_or_else(|_| "default".to_string()),
            timeout_secs: 60,
            max_retries: 2,
        })
    }
}

#[cfg(feature = "llm")]
pub mod client {
    //! HTTP client for the external extraction service.

    use super::*;
    use crate::engine::{ExtractionEngine, ExtractionOutcome};
    use std::time::Duration;
    use tracing::warn;

    #[derive(Serialize)]
    struct ExtractRequest<'a> {
        version: &'static str,
        model: &'a str,
        text: &'a str,
    }

    /// Call the extraction service once. Network failures map onto the typed
    /// error taxonomy; nothing here hangs past the configured timeout.
    pub async fn request_extraction(
        config: &LlmConfig,
        text: &str,
    ) -> Result<LlmPayload, ExtractServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractServiceError::Unreachable(e.to_string()))?;

        let response = client
            .post(&config.endpoint)
            .bearer_auth(&config.api_key)
            .json(&ExtractRequest {
                version: PAYLOAD_VERSION,
                model: &config.model,
                text,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractServiceError::Timeout {
                        secs: config.timeout_secs,
                    }
                } else {
                    ExtractServiceError::Unreachable(e.to_string())
                }
            })?;

        let body = response
            .text()
            .await
            .map_err(|e| ExtractServiceError::Unreachable(e.to_string()))?;
        serde_json::from_str(&body)
            .map_err(|e| ExtractServiceError::BadResponseShape(e.to_string()))
    }

    /// Service-first extraction with deterministic fallback. The fallback is
    /// what makes the service path optional: the pipeline never stalls on an
    /// unreachable provider.
    pub async fn extract_with_fallback(
        engine: &ExtractionEngine,
        config: Option<&LlmConfig>,
        text: &str,
    ) -> ExtractionOutcome {
        if let Some(config) = config {
            match request_extraction(config, text).await {
                Ok(payload) => {
                    match payload_clauses(engine.registry(), &payload) {
                        Ok(clauses) if !clauses.is_empty() => {
                            let detected_family = payload
                                .family_id
                                .clone()
                                .map(|family_id| obligo_registry::DetectedFamily {
                                    family_id,
                                    score: 0,
                                })
                                .unwrap_or_else(|| engine.registry().detect_family(text));
                            return ExtractionOutcome {
                                clauses,
                                warnings: Vec::new(),
                                detected_family,
                            };
                        }
                        Ok(_) => warn!("extraction service returned no usable clauses; falling back"),
                        Err(e) => warn!(error = %e, "bad service payload; falling back"),
                    }
                }
                Err(e) => warn!(error = %e, "extraction service failed; falling back"),
            }
        }
        engine.extract(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_json() -> String {
        serde_json::json!({
            "clauses": [
                {
                    "clause_id": "QUANTITY_TOLERANCE",
                    "category": "commercial",
                    "extracted_fields": {"percent": "5"},
                    "source_text": "Tolerance of 5% more or less, minimum 5000 MT",
                    "section_ref": "sec_3.1",
                    "confidence": "high",
                    "parameter": "quantity_tolerance",
                    "operator": "ge",
                    "value": 5000.0,
                    "unit": "MT"
                },
                {
                    "clause_id": null,
                    "category": "operational",
                    "source_text": "unmatched fragment",
                    "section_ref": "para_9",
                    "confidence": "low"
                }
            ],
            "counterparty": "CF Industries",
            "counterparty_type": "customer",
            "direction": "sale",
            "incoterm": "CFR",
            "term_type": "long_term",
            "family_id": "ammonia_sale_longterm",
            "contract_number": "AMM-2026-014"
        })
        .to_string()
    }

    #[test]
    fn payload_parses_and_drops_null_fragments() {
        let registry = ClauseRegistry::new();
        let (clauses, payload) = parse_payload(&registry, &payload_json()).unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].clause_id, "QUANTITY_TOLERANCE");
        assert_eq!(clauses[0].operator, Some(CmpOp::Ge));
        // Clause type resolved through the registry definition.
        assert_eq!(clauses[0].clause_type, ClauseType::Limit);
        assert_eq!(payload.counterparty, "CF Industries");
    }

    #[test]
    fn malformed_payload_is_a_typed_error() {
        let registry = ClauseRegistry::new();
        let err = parse_payload(&registry, "{not json").unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn payload_with_only_fragments_is_no_clauses() {
        let registry = ClauseRegistry::new();
        let json = serde_json::json!({
            "clauses": [{
                "clause_id": null,
                "category": "operational",
                "source_text": "x",
                "section_ref": "para_0",
                "confidence": "low"
            }],
            "counterparty": "Koch",
            "counterparty_type": "supplier"
        })
        .to_string();
        assert!(matches!(
            parse_payload(&registry, &json).unwrap_err(),
            PayloadError::NoClauses
        ));
    }

    #[test]
    fn incomplete_between_in_payload_is_rejected() {
        let registry = ClauseRegistry::new();
        let json = serde_json::json!({
            "clauses": [{
                "clause_id": "QUANTITY_TOLERANCE",
                "category": "commercial",
                "source_text": "between 4750 and ...",
                "section_ref": "sec_1",
                "confidence": "high",
                "parameter": "quantity_tolerance",
                "operator": "between",
                "value": 4750.0
            }],
            "counterparty": "Koch",
            "counterparty_type": "supplier"
        })
        .to_string();
        assert!(matches!(
            parse_payload(&registry, &json).unwrap_err(),
            PayloadError::Invariant(_)
        ));
    }

    #[test]
    fn payload_assembles_a_draft_contract() {
        let registry = ClauseRegistry::new();
        let (clauses, payload) = parse_payload(&registry, &payload_json()).unwrap();
        let contract = payload_to_contract(clauses, &payload);
        assert_eq!(contract.counterparty, "CF Industries");
        assert_eq!(contract.product_group, "ammonia");
        assert_eq!(contract.family_id.as_deref(), Some("ammonia_sale_longterm"));
        assert_eq!(contract.clauses.len(), 1);
        assert_eq!(contract.version, 0); // store assigns it at ingestion
    }

    #[test]
    fn missing_config_is_typed() {
        std::env::remove_var("OBLIGO_EXTRACT_URL");
        assert!(matches!(
            LlmConfig::from_env().unwrap_err(),
            ExtractServiceError::MissingConfig(_)
        ));
    }
}

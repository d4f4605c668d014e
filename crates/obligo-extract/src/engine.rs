//! The extraction engine: matching, clause assembly, confidence, dedup.

use crate::{fields, normalize_text, rules};
use obligo_model::{Clause, CmpOp, Confidence};
use obligo_registry::{ClauseRegistry, DetectedFamily};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Engine output: the surviving clause list, non-fatal diagnostics, and the
/// family classification.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutcome {
    pub clauses: Vec<Clause>,
    /// Sections that matched a clause anchor but whose numeric extraction
    /// failed. Diagnostics, not failures.
    pub warnings: Vec<String>,
    pub detected_family: DetectedFamily,
}

/// Pure, stateless-per-document extraction engine. Safe to share across the
/// batch worker pool.
pub struct ExtractionEngine {
    registry: Arc<ClauseRegistry>,
    rules: Vec<rules::ClauseRule>,
}

impl ExtractionEngine {
    pub fn new(registry: Arc<ClauseRegistry>) -> Self {
        let rules = rules::build_rules(&registry);
        Self { registry, rules }
    }

    /// Rebuild rules after runtime registry changes.
    pub fn refresh_rules(&mut self) {
        self.rules = rules::build_rules(&self.registry);
    }

    pub fn registry(&self) -> &ClauseRegistry {
        &self.registry
    }

    /// Extract clauses from raw contract text.
    pub fn extract(&self, raw_text: &str) -> ExtractionOutcome {
        let text = normalize_text(raw_text);
        let detected_family = self.registry.detect_family(&text);
        let sections = crate::segment::segment(&text);

        let mut warnings = Vec::new();
        // clause id -> (section index, clause); dedup keeps the best record.
        let mut best: HashMap<String, (usize, Clause)> = HashMap::new();

        for section in &sections {
            let section_text = section.text();
            let Some((rule, anchors)) = self
                .rules
                .iter()
                .find_map(|r| {
                    let anchors = r.matched_anchors(&section_text);
                    (!anchors.is_empty()).then_some((r, anchors))
                })
            else {
                continue; // unmatched section: dropped, not an error
            };

            let Ok(def) = self.registry.definition(&rule.clause_id) else {
                continue;
            };

            let mut clause = Clause::new(
                def.clause_id.clone(),
                def.clause_type,
                def.category,
                section_text.clone(),
                section.section_ref.clone(),
                Confidence::High,
            );
            clause.matched_anchors = anchors;

            extract_clause_fields(&mut clause, &section_text, &mut warnings);
            debug!(
                clause_id = %clause.clause_id,
                section = %clause.section_ref,
                confidence = ?clause.confidence,
                "section matched"
            );

            match best.get(&clause.clause_id) {
                Some((_, existing)) if !beats(&clause, existing) => {}
                _ => {
                    best.insert(clause.clause_id.clone(), (section.index, clause));
                }
            }
        }

        let mut ranked: Vec<(usize, Clause)> = best.into_values().collect();
        ranked.sort_by_key(|(index, _)| *index);
        let clauses = ranked.into_iter().map(|(_, c)| c).collect();

        ExtractionOutcome {
            clauses,
            warnings,
            detected_family,
        }
    }
}

/// Ranking for dedup: confidence first, then presence of a numeric value.
fn beats(candidate: &Clause, incumbent: &Clause) -> bool {
    (candidate.confidence, candidate.value.is_some())
        > (incumbent.confidence, incumbent.value.is_some())
}

/// Clause-id-specific field extraction. Sets parameter/operator/value where
/// the clause is solver-binding, and downgrades confidence when an expected
/// numeric value is missing.
fn extract_clause_fields(clause: &mut Clause, text: &str, warnings: &mut Vec<String>) {
    let mut numeric_missing = |clause: &mut Clause| {
        clause.confidence = Confidence::Low;
        warnings.push(format!(
            "section {}: matched {} but no numeric value extracted",
            clause.section_ref, clause.clause_id
        ));
    };

    match clause.clause_id.as_str() {
        "QUANTITY" => match fields::quantity(text) {
            Some(q) => {
                clause.parameter = Some("contract_quantity".to_string());
                clause.operator = Some(CmpOp::Le);
                clause.value = Some(q.value);
                clause.unit = q.unit;
                clause.period = fields::period(text);
            }
            None => numeric_missing(clause),
        },
        "QUANTITY_TOLERANCE" => {
            if let Some(p) = fields::percent(text) {
                clause
                    .extracted_fields
                    .insert("percent".to_string(), p.to_string());
            }
            match fields::quantity(text) {
                Some(q) => {
                    clause.parameter = Some("quantity_tolerance".to_string());
                    clause.operator = Some(CmpOp::Ge);
                    clause.value = Some(q.value);
                    clause.unit = q.unit;
                }
                None if clause.extracted_fields.contains_key("percent") => {
                    // Tolerance stated only as a percentage: informational
                    // until a base quantity is known.
                    clause.parameter = Some("quantity_tolerance".to_string());
                    clause.confidence = Confidence::Medium;
                }
                None => numeric_missing(clause),
            }
        }
        "MIN_MONTHLY_VOLUME" | "TAKE_OR_PAY" => {
            if let Some(p) = fields::percent(text) {
                clause
                    .extracted_fields
                    .insert("percent".to_string(), p.to_string());
            }
            match fields::quantity(text) {
                Some(q) => {
                    clause.parameter = Some("volume_floor".to_string());
                    clause.operator = Some(CmpOp::Ge);
                    clause.value = Some(q.value);
                    clause.unit = q.unit;
                    clause.period = fields::period(text).or_else(|| {
                        (clause.clause_id == "MIN_MONTHLY_VOLUME")
                            .then(|| "per_month".to_string())
                    });
                }
                None => numeric_missing(clause),
            }
        }
        "PRICE" => {
            if let Some(rate) = fields::rate_per_unit(text) {
                clause.parameter = Some("nh3_price".to_string());
                clause.operator = Some(CmpOp::Eq);
                clause.value = Some(rate.value);
                clause.unit = rate.unit.map(|u| format!("USD/{}", u));
            } else if let Some(amount) = fields::currency_amount(text) {
                clause.parameter = Some("nh3_price".to_string());
                clause.operator = Some(CmpOp::Eq);
                clause.value = Some(amount);
                clause.unit = Some("USD".to_string());
            } else if let Some(index) = fields::index_reference(text) {
                // Index-determined price: no number to extract, by design.
                clause.extracted_fields.insert("index".to_string(), index);
                clause.confidence = Confidence::Medium;
            } else {
                numeric_missing(clause);
            }
        }
        "PRICE_ESCALATION" => {
            match fields::percent(text) {
                Some(p) => {
                    clause
                        .extracted_fields
                        .insert("percent".to_string(), p.to_string());
                }
                None => clause.confidence = Confidence::Medium,
            }
            if let Some(index) = fields::index_reference(text) {
                clause.extracted_fields.insert("index".to_string(), index);
            }
        }
        "PRICE_INDEX" => match fields::index_reference(text) {
            Some(index) => {
                clause.extracted_fields.insert("index".to_string(), index);
            }
            None => clause.confidence = Confidence::Medium,
        },
        "DEMURRAGE" => match fields::rate_per_unit(text) {
            Some(rate) => {
                clause.penalty_per_unit = Some(rate.value);
                clause.unit = rate.unit.map(|u| format!("USD/{}", u));
                clause.period = Some("per_day".to_string());
                clause.penalty_cap = fields::penalty_cap(text);
            }
            None => numeric_missing(clause),
        },
        "SHORTFALL_PENALTY" => {
            if let Some(p) = fields::percent(text) {
                clause
                    .extracted_fields
                    .insert("threshold_percent".to_string(), p.to_string());
            }
            match fields::rate_per_unit(text).map(|r| (r.value, r.unit)) {
                Some((value, unit)) => {
                    clause.penalty_per_unit = Some(value);
                    clause.unit = unit.map(|u| format!("USD/{}", u));
                    clause.penalty_cap = fields::penalty_cap(text);
                }
                None => numeric_missing(clause),
            }
        }
        "CREDIT_LIMIT" => match fields::currency_amount(text) {
            Some(amount) => {
                clause
                    .extracted_fields
                    .insert("amount".to_string(), amount.to_string());
                clause.unit = Some("USD".to_string());
            }
            None => numeric_missing(clause),
        },
        "PAYMENT_TERMS" => match fields::payment_days(text) {
            Some(days) => {
                clause
                    .extracted_fields
                    .insert("days".to_string(), days.to_string());
            }
            None => clause.confidence = Confidence::Medium,
        },
        "DELIVERY_WINDOW" | "LAYCAN" => {
            clause.period = fields::period(text);
        }
        // Presence clauses: the anchor match itself is the extraction.
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALE_CONTRACT: &str = r#"
SALES AGREEMENT

This long term Sales Agreement covers anhydrous ammonia delivered by barge. Seller shall deliver monthly cargoes to Buyer's terminal.

Section 3. Quantity

Seller shall sell a total quantity of 60,000 MT per year of anhydrous ammonia.

Section 3.1 Quantity Tolerance

Quantity tolerance of 5% more or less at Seller's option, minimum 5,000 MT per month.

Section 4. Price

The contract price shall be USD 400 per metric ton CFR St. Louis.

Section 5. Shortfall

Should Seller fail to deliver, a penalty of $15 per ton of shortfall applies, capped at $250,000.

Section 6. Payment Terms

Payment shall be made net 30 days from bill of lading date.

ARTICLE 7 FORCE MAJEURE

Neither party shall be liable for failure caused by events beyond the reasonable control of that party.
"#;

    fn engine() -> ExtractionEngine {
        ExtractionEngine::new(Arc::new(ClauseRegistry::new()))
    }

    fn find<'a>(outcome: &'a ExtractionOutcome, id: &str) -> &'a Clause {
        outcome
            .clauses
            .iter()
            .find(|c| c.clause_id == id)
            .unwrap_or_else(|| panic!("expected clause {id}"))
    }

    #[test]
    fn extracts_full_sale_contract() {
        let outcome = engine().extract(SALE_CONTRACT);
        assert_eq!(outcome.detected_family.family_id, "ammonia_sale_longterm");

        let qty = find(&outcome, "QUANTITY");
        assert_eq!(qty.value, Some(60000.0));
        assert_eq!(qty.operator, Some(CmpOp::Le));
        assert_eq!(qty.period.as_deref(), Some("per_year"));

        let tol = find(&outcome, "QUANTITY_TOLERANCE");
        assert_eq!(tol.operator, Some(CmpOp::Ge));
        assert_eq!(tol.value, Some(5000.0));
        assert_eq!(tol.extracted_fields.get("percent").map(String::as_str), Some("5"));

        let price = find(&outcome, "PRICE");
        assert_eq!(price.value, Some(400.0));
        assert_eq!(price.operator, Some(CmpOp::Eq));
        assert_eq!(price.confidence, Confidence::High);

        let pen = find(&outcome, "SHORTFALL_PENALTY");
        assert_eq!(pen.penalty_per_unit, Some(15.0));
        assert_eq!(pen.penalty_cap, Some(250000.0));

        let pay = find(&outcome, "PAYMENT_TERMS");
        assert_eq!(pay.extracted_fields.get("days").map(String::as_str), Some("30"));

        let fm = find(&outcome, "FORCE_MAJEURE");
        assert_eq!(fm.section_ref, "art_7");
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn index_priced_contract_downgrades_to_medium() {
        // An index phrase with no PRICE_INDEX anchor: the section stays a
        // PRICE clause, numberless, at medium confidence.
        let text = "Section 4. Price\n\nThe contract price shall be determined monthly against the prevailing market index.";
        let outcome = engine().extract(text);
        let price = find(&outcome, "PRICE");
        assert_eq!(price.confidence, Confidence::Medium);
        assert_eq!(price.value, None);
        assert_eq!(
            price.extracted_fields.get("index").map(String::as_str),
            Some("market index")
        );
    }

    #[test]
    fn named_index_section_yields_price_index_not_price() {
        // A recognized published index claims the section outright.
        let text = "Section 4. Price\n\nThe price shall be determined monthly basis the Tampa Index.";
        let outcome = engine().extract(text);
        assert!(outcome.clauses.iter().all(|c| c.clause_id != "PRICE"));
        let index = find(&outcome, "PRICE_INDEX");
        assert_eq!(index.confidence, Confidence::High);
        assert_eq!(
            index.extracted_fields.get("index").map(String::as_str),
            Some("tampa index")
        );
    }

    #[test]
    fn missing_numeric_yields_low_confidence_and_warning() {
        let text = "Section 4. Price\n\nThe contract price shall be agreed between the parties.";
        let outcome = engine().extract(text);
        let price = find(&outcome, "PRICE");
        assert_eq!(price.confidence, Confidence::Low);
        assert!(outcome.warnings.iter().any(|w| w.contains("PRICE")));
    }

    #[test]
    fn dedup_keeps_best_record_per_clause_id() {
        let text = "Section 4. Price\n\nThe contract price shall be agreed later.\n\nSection 9. Price Schedule\n\nThe contract price shall be USD 385 per metric ton.";
        let outcome = engine().extract(text);
        let prices: Vec<_> = outcome
            .clauses
            .iter()
            .filter(|c| c.clause_id == "PRICE")
            .collect();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].value, Some(385.0));
        assert_eq!(prices[0].confidence, Confidence::High);
    }

    #[test]
    fn clauses_come_back_in_section_order() {
        let outcome = engine().extract(SALE_CONTRACT);
        let ids: Vec<_> = outcome.clauses.iter().map(|c| c.clause_id.as_str()).collect();
        let pos = |id: &str| ids.iter().position(|x| *x == id).unwrap();
        assert!(pos("QUANTITY") < pos("PRICE"));
        assert!(pos("PRICE") < pos("FORCE_MAJEURE"));
    }

    #[test]
    fn refresh_rules_picks_up_runtime_registrations() {
        let registry = Arc::new(ClauseRegistry::new());
        let mut engine = ExtractionEngine::new(registry.clone());
        let text = "Section 2. Heel\n\nA heel retention remains on board after discharge.";
        assert!(engine.extract(text).clauses.is_empty());

        registry.register_clause(obligo_registry::ClauseDefinition {
            clause_id: "HEEL_RETENTION".to_string(),
            clause_type: obligo_model::ClauseType::Operational,
            category: obligo_model::ClauseCategory::Operational,
            anchors: vec!["heel retention".to_string()],
            extractable_fields: vec![],
            parameters: vec![],
            default_requirement: None,
        });
        engine.refresh_rules();
        let outcome = engine.extract(text);
        assert!(outcome.clauses.iter().any(|c| c.clause_id == "HEEL_RETENTION"));
    }

    #[test]
    fn unmatched_sections_are_skipped_silently() {
        let outcome = engine().extract("Recitals\n\nWhereas the parties wish to cooperate.");
        assert!(outcome.clauses.is_empty());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn extracted_clauses_satisfy_structural_invariants() {
        let outcome = engine().extract(SALE_CONTRACT);
        for clause in &outcome.clauses {
            clause.validate().unwrap();
        }
    }
}

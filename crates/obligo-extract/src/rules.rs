//! Ordered clause-matching rules.
//!
//! Rules are evaluated most-specific first and the first clause id with at
//! least one matching pattern claims the section; there are no multi-label
//! sections. Patterns come from the registry's anchor strings (so runtime
//! registrations participate) plus a few hand-tuned phrasings the anchors
//! alone would miss.

use obligo_registry::ClauseRegistry;
use regex::{Regex, RegexBuilder};

/// One matching rule: a clause id and its alternative patterns, each paired
/// with the human-readable anchor it came from.
pub struct ClauseRule {
    pub clause_id: String,
    pub patterns: Vec<(Regex, String)>,
}

impl ClauseRule {
    /// All anchors whose pattern matches, or empty if the rule does not apply.
    pub fn matched_anchors(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, anchor)| anchor.clone())
            .collect()
    }
}

/// Specificity order for the base catalog. Multi-word operative phrases come
/// first; bare `QUANTITY` matches half the document, so it goes last.
const SPECIFICITY_ORDER: &[&str] = &[
    "TAKE_OR_PAY",
    "QUANTITY_TOLERANCE",
    "MIN_MONTHLY_VOLUME",
    "SHORTFALL_PENALTY",
    "DEMURRAGE",
    "PRICE_ESCALATION",
    "PRICE_INDEX",
    "LAYCAN",
    "DELIVERY_WINDOW",
    "NOMINATION",
    "CREDIT_LIMIT",
    "PAYMENT_TERMS",
    "FORCE_MAJEURE",
    "ARBITRATION",
    "GOVERNING_LAW",
    "COMPLIANCE_SANCTIONS",
    "INSPECTION",
    "DOCUMENTATION",
    "PRICE",
    "QUANTITY",
];

/// Extra phrasings per clause id that the registry anchors alone would miss.
fn extra_patterns(clause_id: &str) -> &'static [&'static str] {
    match clause_id {
        "QUANTITY_TOLERANCE" => &[r"plus or minus", r"\+/-\s*\d"],
        "SHORTFALL_PENALTY" => &[r"fails? to deliver", r"deficienc(?:y|ies)"],
        "PRICE" => &[r"(?:usd|us\$|\$)\s*[\d,]+(?:\.\d+)?\s*(?:per|/)\s*(?:metric ton|mt|ton)"],
        "DELIVERY_WINDOW" => &[r"delivery to be made", r"shipment window"],
        "PAYMENT_TERMS" => &[r"net\s*\d{1,3}\b", r"payment shall be made"],
        "QUANTITY" => &[r"[\d,]+\s*(?:mt|metric tons?|tons?)\b"],
        _ => &[],
    }
}

fn anchor_pattern(anchor: &str) -> Regex {
    RegexBuilder::new(&regex::escape(anchor))
        .case_insensitive(true)
        .build()
        .expect("escaped anchor is always a valid pattern")
}

fn raw_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("rule patterns are compiled from a fixed table")
}

/// Build the ordered rule list from the registry. Clause ids outside the
/// base specificity order (runtime registrations) slot in just before the
/// catch-all `PRICE`/`QUANTITY` tail.
pub fn build_rules(registry: &ClauseRegistry) -> Vec<ClauseRule> {
    let defs = registry.definitions();

    let mut ordered: Vec<String> = Vec::with_capacity(defs.len());
    let tail_start = SPECIFICITY_ORDER.len() - 2; // PRICE, QUANTITY
    for id in &SPECIFICITY_ORDER[..tail_start] {
        if defs.contains_key(*id) {
            ordered.push((*id).to_string());
        }
    }
    for id in defs.keys() {
        if !SPECIFICITY_ORDER.contains(&id.as_str()) {
            ordered.push(id.clone());
        }
    }
    for id in &SPECIFICITY_ORDER[tail_start..] {
        if defs.contains_key(*id) {
            ordered.push((*id).to_string());
        }
    }

    ordered
        .into_iter()
        .map(|id| {
            let def = &defs[&id];
            let mut patterns: Vec<(Regex, String)> = def
                .anchors
                .iter()
                .map(|a| (anchor_pattern(a), a.clone()))
                .collect();
            for p in extra_patterns(&id) {
                patterns.push((raw_pattern(p), (*p).to_string()));
            }
            ClauseRule {
                clause_id: id,
                patterns,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_order_puts_specific_before_generic() {
        let registry = ClauseRegistry::new();
        let rules = build_rules(&registry);
        let pos = |id: &str| rules.iter().position(|r| r.clause_id == id).unwrap();
        assert!(pos("TAKE_OR_PAY") < pos("QUANTITY"));
        assert!(pos("SHORTFALL_PENALTY") < pos("PRICE"));
        assert_eq!(rules.last().unwrap().clause_id, "QUANTITY");
    }

    #[test]
    fn tolerance_section_matches_tolerance_not_quantity() {
        let registry = ClauseRegistry::new();
        let rules = build_rules(&registry);
        let text = "Quantity Tolerance\nSeller may deliver 5,000 MT plus or minus 5%";
        let first = rules
            .iter()
            .find(|r| !r.matched_anchors(text).is_empty())
            .unwrap();
        assert_eq!(first.clause_id, "QUANTITY_TOLERANCE");
    }

    #[test]
    fn runtime_registered_clause_participates() {
        let registry = ClauseRegistry::new();
        registry.register_clause(obligo_registry::ClauseDefinition {
            clause_id: "HEEL_RETENTION".to_string(),
            clause_type: obligo_model::ClauseType::Operational,
            category: obligo_model::ClauseCategory::Operational,
            anchors: vec!["heel retention".to_string()],
            extractable_fields: vec![],
            parameters: vec![],
            default_requirement: None,
        });
        let rules = build_rules(&registry);
        let rule = rules
            .iter()
            .find(|r| !r.matched_anchors("Barge heel retention applies.").is_empty())
            .unwrap();
        assert_eq!(rule.clause_id, "HEEL_RETENTION");
        // But it must not shadow the generic tail incorrectly.
        let pos = |id: &str| rules.iter().position(|r| r.clause_id == id).unwrap();
        assert!(pos("HEEL_RETENTION") < pos("QUANTITY"));
    }
}

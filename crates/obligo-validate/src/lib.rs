//! Obligo completeness validator
//!
//! Compares a contract's extracted clauses against its family's
//! required/expected list and flags:
//!
//! - missing required clauses (these block submission),
//! - missing expected clauses (warnings),
//! - low-confidence extractions,
//! - suspicious numeric values (outside `[0.1 x lo, 10 x hi]` of the sane
//!   range for the clause's solver parameter) and direct contradictions
//!   (a `>=` floor above a `<=` ceiling on the same parameter).
//!
//! The validator is a pure function of (contract, registry, ranges). Policy
//! consequences — whether a finding blocks a gate — live in `obligo-gates`;
//! unresolvable input (an unknown family) is the one thing that errors here.

pub mod sap;

use obligo_model::{CmpOp, Confidence, Contract};
use obligo_registry::{ClauseRegistry, RegistryError, RequirementLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("cannot resolve contract family: no family_id, template, or direction/term match")]
    UnresolvableFamily,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Coverage of one requirement from the family's expected-clause list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementCoverage {
    pub clause_id: String,
    pub level: RequirementLevel,
    pub satisfied: bool,
}

/// One validation finding. `ValueSuspicious` with `conflict = true` marks a
/// direct floor/ceiling contradiction rather than an out-of-range value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    MissingRequired {
        clause_id: String,
    },
    MissingExpected {
        clause_id: String,
    },
    LowConfidence {
        clause_id: String,
        section_ref: String,
    },
    ValueSuspicious {
        clause_id: String,
        parameter: String,
        message: String,
        conflict: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub family_id: String,
    pub requirements: Vec<RequirementCoverage>,
    pub findings: Vec<Finding>,
    /// `(total requirements - missing) / total requirements`, in percent.
    pub completeness_pct: f64,
    /// True iff any required clause is missing.
    pub blocks_submission: bool,
}

impl ValidationResult {
    pub fn missing_required(&self) -> Vec<&str> {
        self.findings
            .iter()
            .filter_map(|f| match f {
                Finding::MissingRequired { clause_id } => Some(clause_id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True iff every `required`-level requirement is satisfied, regardless of
    /// expected-level gaps.
    pub fn required_met(&self) -> bool {
        self.requirements
            .iter()
            .filter(|r| r.level == RequirementLevel::Required)
            .all(|r| r.satisfied)
    }

    /// Numeric floor/ceiling contradictions only (gate 1 blocks on these).
    pub fn numeric_conflicts(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| matches!(f, Finding::ValueSuspicious { conflict: true, .. }))
            .collect()
    }
}

/// Sane value ranges per solver parameter, used for the out-of-range check.
/// Loaded from product-group configuration when available; [`builtin`]
/// otherwise.
///
/// [`builtin`]: VariableRanges::builtin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRanges {
    pub ranges: BTreeMap<String, (f64, f64)>,
}

impl VariableRanges {
    /// Fallback table for the river-trading book, in the unit each parameter
    /// is quoted in (USD/MT for prices, MT for volumes).
    pub fn builtin() -> Self {
        let mut ranges = BTreeMap::new();
        ranges.insert("nh3_price".to_string(), (150.0, 900.0));
        ranges.insert("sell_stl".to_string(), (200.0, 1000.0));
        ranges.insert("sell_mem".to_string(), (200.0, 1000.0));
        ranges.insert("nola_buy".to_string(), (150.0, 800.0));
        ranges.insert("contract_quantity".to_string(), (1000.0, 500_000.0));
        ranges.insert("volume_floor".to_string(), (500.0, 100_000.0));
        ranges.insert("quantity_tolerance".to_string(), (100.0, 50_000.0));
        Self { ranges }
    }

    pub fn get(&self, parameter: &str) -> Option<(f64, f64)> {
        self.ranges.get(parameter).copied()
    }
}

/// Resolve the family to validate against: explicit `family_id`, else the
/// template type when it names a known family, else a direction/term/Incoterm
/// match. Unresolvable is a typed input error, never defaulted.
pub fn resolve_family(
    registry: &ClauseRegistry,
    contract: &Contract,
) -> Result<String, ValidationError> {
    if let Some(id) = &contract.family_id {
        registry.family(id)?;
        return Ok(id.clone());
    }
    if let Some(template) = &contract.template_type {
        if registry.family(template).is_ok() {
            return Ok(template.clone());
        }
    }
    if let (Some(direction), Some(term_type)) = (contract.direction, contract.term_type) {
        let candidate = registry
            .families()
            .into_iter()
            .filter(|f| f.direction == direction && f.term_type == term_type)
            .find(|f| match &contract.incoterm {
                Some(inco) => f.default_incoterm.eq_ignore_ascii_case(inco),
                None => true,
            });
        if let Some(fam) = candidate {
            return Ok(fam.family_id);
        }
    }
    Err(ValidationError::UnresolvableFamily)
}

/// Run the completeness validation for one contract.
pub fn validate_contract(
    registry: &ClauseRegistry,
    contract: &Contract,
    ranges: &VariableRanges,
) -> Result<ValidationResult, ValidationError> {
    let family_id = resolve_family(registry, contract)?;
    let requirements_spec = registry.family_requirements(&family_id)?;

    let mut findings = Vec::new();
    let mut requirements = Vec::with_capacity(requirements_spec.len());
    let mut missing = 0usize;

    for req in &requirements_spec {
        let satisfied = contract.clauses.iter().any(|c| c.clause_id == req.clause_id);
        if !satisfied {
            missing += 1;
            match req.level {
                RequirementLevel::Required => findings.push(Finding::MissingRequired {
                    clause_id: req.clause_id.clone(),
                }),
                RequirementLevel::Expected => findings.push(Finding::MissingExpected {
                    clause_id: req.clause_id.clone(),
                }),
            }
        }
        requirements.push(RequirementCoverage {
            clause_id: req.clause_id.clone(),
            level: req.level,
            satisfied,
        });
    }

    for clause in &contract.clauses {
        if clause.confidence == Confidence::Low {
            findings.push(Finding::LowConfidence {
                clause_id: clause.clause_id.clone(),
                section_ref: clause.section_ref.clone(),
            });
        }
    }

    findings.extend(range_findings(contract, ranges));
    findings.extend(conflict_findings(contract));

    let total = requirements.len();
    let completeness_pct = if total == 0 {
        100.0
    } else {
        (total - missing) as f64 / total as f64 * 100.0
    };
    let blocks_submission = findings
        .iter()
        .any(|f| matches!(f, Finding::MissingRequired { .. }));

    Ok(ValidationResult {
        family_id,
        requirements,
        findings,
        completeness_pct,
        blocks_submission,
    })
}

/// Out-of-range values: below a tenth of the sane floor or above ten times
/// the sane ceiling for the clause's parameter.
fn range_findings(contract: &Contract, ranges: &VariableRanges) -> Vec<Finding> {
    let mut out = Vec::new();
    for clause in &contract.clauses {
        let (Some(parameter), Some(value)) = (&clause.parameter, clause.value) else {
            continue;
        };
        let Some((lo, hi)) = ranges.get(parameter) else {
            continue;
        };
        if value < lo * 0.1 || value > hi * 10.0 {
            out.push(Finding::ValueSuspicious {
                clause_id: clause.clause_id.clone(),
                parameter: parameter.clone(),
                message: format!(
                    "{value} is outside the sane range [{lo}, {hi}] for {parameter}"
                ),
                conflict: false,
            });
        }
    }
    out
}

/// Direct contradictions: on any single parameter, the highest `>=` floor
/// exceeding the lowest `<=` ceiling.
fn conflict_findings(contract: &Contract) -> Vec<Finding> {
    struct Bound<'a> {
        clause_id: &'a str,
        value: f64,
    }
    let mut floors: BTreeMap<&str, Bound> = BTreeMap::new();
    let mut ceilings: BTreeMap<&str, Bound> = BTreeMap::new();

    for clause in &contract.clauses {
        let (Some(parameter), Some(op), Some(value)) =
            (&clause.parameter, clause.operator, clause.value)
        else {
            continue;
        };
        match op {
            CmpOp::Ge => {
                let entry = floors.entry(parameter).or_insert(Bound {
                    clause_id: &clause.clause_id,
                    value,
                });
                if value > entry.value {
                    *entry = Bound {
                        clause_id: &clause.clause_id,
                        value,
                    };
                }
            }
            CmpOp::Le => {
                let entry = ceilings.entry(parameter).or_insert(Bound {
                    clause_id: &clause.clause_id,
                    value,
                });
                if value < entry.value {
                    *entry = Bound {
                        clause_id: &clause.clause_id,
                        value,
                    };
                }
            }
            CmpOp::Eq | CmpOp::Between => {}
        }
    }

    let mut out = Vec::new();
    for (parameter, floor) in &floors {
        if let Some(ceiling) = ceilings.get(parameter) {
            if floor.value > ceiling.value {
                out.push(Finding::ValueSuspicious {
                    clause_id: floor.clause_id.to_string(),
                    parameter: (*parameter).to_string(),
                    message: format!(
                        "{} floor {} exceeds {} ceiling {} on {parameter}",
                        floor.clause_id, floor.value, ceiling.clause_id, ceiling.value
                    ),
                    conflict: true,
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use obligo_model::{
        Clause, ClauseCategory, ClauseType, Confidence, Contract, CounterpartyType, Direction,
        TermType,
    };
    use obligo_registry::{ClauseDefinition, FamilySignature};

    fn clause(id: &str, parameter: Option<&str>, op: Option<CmpOp>, value: Option<f64>) -> Clause {
        let mut c = Clause::new(
            id,
            ClauseType::Obligation,
            ClauseCategory::Core,
            format!("{id} source span"),
            "sec_1",
            Confidence::High,
        );
        c.parameter = parameter.map(str::to_string);
        c.operator = op;
        c.value = value;
        c
    }

    fn contract_with(family: &str, clauses: Vec<Clause>) -> Contract {
        let mut c = Contract::draft("CF Industries", CounterpartyType::Customer, "ammonia");
        c.family_id = Some(family.to_string());
        c.clauses = clauses;
        c
    }

    #[test]
    fn missing_required_blocks_submission() {
        let registry = ClauseRegistry::new();
        let contract = contract_with(
            "ammonia_sale_spot",
            vec![clause("QUANTITY", Some("contract_quantity"), Some(CmpOp::Le), Some(60000.0))],
        );
        let result = validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap();
        assert!(result.blocks_submission);
        assert!(result.missing_required().contains(&"PRICE"));
        assert!(!result.required_met());
    }

    #[test]
    fn all_required_present_does_not_block_despite_missing_expected() {
        // A wide family: 20 expected ids, 12 of them required. Extracting 15
        // clauses that cover every required id must not block, whatever
        // expected-level ids are still missing.
        let registry = ClauseRegistry::new();
        let required: Vec<String> = (0..12).map(|i| format!("REQ_{i}")).collect();
        let expected: Vec<String> = (0..8).map(|i| format!("EXP_{i}")).collect();
        for id in &required {
            registry.register_clause(ClauseDefinition {
                clause_id: id.clone(),
                clause_type: ClauseType::Obligation,
                category: ClauseCategory::Core,
                anchors: vec![id.to_lowercase()],
                extractable_fields: vec![],
                parameters: vec![],
                default_requirement: None,
            });
        }
        for id in &expected {
            registry.register_clause(ClauseDefinition {
                clause_id: id.clone(),
                clause_type: ClauseType::Operational,
                category: ClauseCategory::Operational,
                anchors: vec![id.to_lowercase()],
                extractable_fields: vec![],
                parameters: vec![],
                default_requirement: None,
            });
        }
        registry.register_family(FamilySignature {
            family_id: "wide_family".to_string(),
            anchors: vec!["wide".to_string()],
            direction: Direction::Sale,
            term_type: TermType::LongTerm,
            transport_mode: "barge".to_string(),
            default_incoterm: "CFR".to_string(),
            expected_clauses: required.iter().chain(expected.iter()).cloned().collect(),
        });

        let mut clauses: Vec<Clause> = required
            .iter()
            .map(|id| clause(id, None, None, None))
            .collect();
        clauses.extend(expected.iter().take(3).map(|id| clause(id, None, None, None)));
        assert_eq!(clauses.len(), 15);

        let contract = contract_with("wide_family", clauses);
        let result = validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap();
        assert!(!result.blocks_submission);
        assert!(result.required_met());
        assert!(result.missing_required().is_empty());
        // Five expected ids remain uncovered.
        let missing_expected = result
            .findings
            .iter()
            .filter(|f| matches!(f, Finding::MissingExpected { .. }))
            .count();
        assert_eq!(missing_expected, 5);
        approx::assert_relative_eq!(result.completeness_pct, 75.0);
    }

    #[test]
    fn price_floor_above_ceiling_is_a_conflict() {
        let registry = ClauseRegistry::new();
        let contract = contract_with(
            "ammonia_sale_spot",
            vec![
                clause("PRICE", Some("nh3_price"), Some(CmpOp::Ge), Some(450.0)),
                clause("PRICE", Some("nh3_price"), Some(CmpOp::Le), Some(400.0)),
            ],
        );
        let result = validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap();
        let conflicts = result.numeric_conflicts();
        assert_eq!(conflicts.len(), 1);
        match conflicts[0] {
            Finding::ValueSuspicious {
                parameter,
                conflict,
                ..
            } => {
                assert_eq!(parameter, "nh3_price");
                assert!(conflict);
            }
            other => panic!("unexpected finding {other:?}"),
        }
    }

    #[test]
    fn out_of_range_value_is_suspicious_but_not_a_conflict() {
        let registry = ClauseRegistry::new();
        // $5/MT ammonia is below a tenth of the sane floor.
        let contract = contract_with(
            "ammonia_sale_spot",
            vec![clause("PRICE", Some("nh3_price"), Some(CmpOp::Eq), Some(5.0))],
        );
        let result = validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap();
        assert!(result
            .findings
            .iter()
            .any(|f| matches!(f, Finding::ValueSuspicious { conflict: false, .. })));
        assert!(result.numeric_conflicts().is_empty());
    }

    #[test]
    fn low_confidence_clauses_are_flagged() {
        let registry = ClauseRegistry::new();
        let mut c = clause("PRICE", Some("nh3_price"), None, None);
        c.confidence = Confidence::Low;
        let contract = contract_with("ammonia_sale_spot", vec![c]);
        let result = validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap();
        assert!(result
            .findings
            .iter()
            .any(|f| matches!(f, Finding::LowConfidence { clause_id, .. } if clause_id == "PRICE")));
    }

    #[test]
    fn family_inferred_from_direction_and_term() {
        let registry = ClauseRegistry::new();
        let mut contract = contract_with("ammonia_sale_longterm", vec![]);
        contract.family_id = None;
        contract.direction = Some(Direction::Sale);
        contract.term_type = Some(TermType::LongTerm);
        contract.incoterm = Some("CFR".to_string());
        assert_eq!(
            resolve_family(&registry, &contract).unwrap(),
            "ammonia_sale_longterm"
        );
    }

    #[test]
    fn unresolvable_family_is_a_typed_error() {
        let registry = ClauseRegistry::new();
        let mut contract = contract_with("x", vec![]);
        contract.family_id = None;
        contract.template_type = None;
        assert!(matches!(
            validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap_err(),
            ValidationError::UnresolvableFamily
        ));
    }

    #[test]
    fn explicit_unknown_family_errors_through_registry() {
        let registry = ClauseRegistry::new();
        let contract = contract_with("potash_rail_spot", vec![]);
        assert!(matches!(
            validate_contract(&registry, &contract, &VariableRanges::builtin()).unwrap_err(),
            ValidationError::Registry(RegistryError::UnknownFamily(_))
        ));
    }
}

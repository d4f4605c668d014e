//! Obligo clause/family registry
//!
//! The registry is the single source of truth for what a clause *is* and what
//! a contract family *expects*:
//!
//! - [`ClauseDefinition`] — canonical clause id, detection anchors,
//!   extractable fields, solver parameter mapping
//! - [`FamilySignature`] — template classification (direction / term /
//!   transport / Incoterm) plus the ordered expected-clause list
//!
//! Definitions come from an immutable compiled base set ([`catalog`]) merged
//! with a runtime overlay. Registration is an idempotent upsert into the
//! overlay, visible to all subsequent lookups without restart; the overlay
//! wins on id collision. The overlay serializes to a versioned JSON file so
//! runtime-learned definitions survive restart.

pub mod catalog;

use obligo_model::{ClauseCategory, ClauseType, Direction, TermType};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

pub use catalog::{base_definitions, base_families, requirement_for_category};

/// Requirement level of a clause within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementLevel {
    Required,
    Expected,
}

/// Registry entry describing one canonical clause. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseDefinition {
    pub clause_id: String,
    pub clause_type: ClauseType,
    pub category: ClauseCategory,
    /// Anchor strings/phrases used for detection (case-insensitive substrings).
    pub anchors: Vec<String>,
    /// Field names the extractor may derive for this clause.
    pub extractable_fields: Vec<String>,
    /// Optimizer variable identifiers this clause may constrain.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Explicit requirement level; when absent it derives from the category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_requirement: Option<RequirementLevel>,
}

impl ClauseDefinition {
    pub fn requirement(&self) -> RequirementLevel {
        self.default_requirement
            .unwrap_or_else(|| requirement_for_category(self.category))
    }
}

/// Registry entry describing one contract family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilySignature {
    pub family_id: String,
    /// Anchor strings used to classify a document into this family.
    pub anchors: Vec<String>,
    pub direction: Direction,
    pub term_type: TermType,
    pub transport_mode: String,
    pub default_incoterm: String,
    /// Ordered list of expected clause ids; requirement level per clause is
    /// derived via [`ClauseRegistry::family_requirements`].
    pub expected_clauses: Vec<String>,
}

/// Per-clause requirement record expanded from a family's expected list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseRequirement {
    pub clause_id: String,
    pub level: RequirementLevel,
    pub category: ClauseCategory,
}

/// Family detection result. `family_id` is `"unknown"` when no anchor matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedFamily {
    pub family_id: String,
    /// Number of anchors found in the document.
    pub score: usize,
}

impl DetectedFamily {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            family_id: Self::UNKNOWN.to_string(),
            score: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.family_id == Self::UNKNOWN
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown family: {0}")]
    UnknownFamily(String),
    #[error("unknown clause definition: {0}")]
    UnknownClause(String),
}

pub const OVERLAY_FILE_VERSION_V1: u32 = 1;

/// Serialized form of the runtime overlay (spec: runtime-learned definitions
/// must survive restart).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayFileV1 {
    pub version: u32,
    #[serde(default)]
    pub clauses: BTreeMap<String, ClauseDefinition>,
    #[serde(default)]
    pub families: Vec<FamilySignature>,
}

#[derive(Default)]
struct Overlay {
    clauses: BTreeMap<String, ClauseDefinition>,
    /// Kept as a vec to preserve registration order for detection tie-breaks.
    families: Vec<FamilySignature>,
}

/// Compiled base catalog + mutable overlay. Lookups always merge both, with
/// the overlay winning on id collision.
pub struct ClauseRegistry {
    base_definitions: Vec<ClauseDefinition>,
    base_families: Vec<FamilySignature>,
    overlay: RwLock<Overlay>,
}

impl Default for ClauseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClauseRegistry {
    /// Registry over the compiled base catalog with an empty overlay.
    pub fn new() -> Self {
        Self {
            base_definitions: catalog::base_definitions(),
            base_families: catalog::base_families(),
            overlay: RwLock::new(Overlay::default()),
        }
    }

    /// Merged clause-id → definition map (overlay wins on collision).
    pub fn definitions(&self) -> BTreeMap<String, ClauseDefinition> {
        let mut merged: BTreeMap<String, ClauseDefinition> = self
            .base_definitions
            .iter()
            .map(|d| (d.clause_id.clone(), d.clone()))
            .collect();
        for (id, d) in self.overlay.read().clauses.iter() {
            merged.insert(id.clone(), d.clone());
        }
        merged
    }

    /// Merged family list in registration order (overlay replaces in place on
    /// collision, new overlay families append).
    pub fn families(&self) -> Vec<FamilySignature> {
        let mut merged = self.base_families.clone();
        let overlay = self.overlay.read();
        for fam in overlay.families.iter() {
            match merged.iter_mut().find(|f| f.family_id == fam.family_id) {
                Some(slot) => *slot = fam.clone(),
                None => merged.push(fam.clone()),
            }
        }
        merged
    }

    pub fn definition(&self, clause_id: &str) -> Result<ClauseDefinition, RegistryError> {
        if let Some(d) = self.overlay.read().clauses.get(clause_id) {
            return Ok(d.clone());
        }
        self.base_definitions
            .iter()
            .find(|d| d.clause_id == clause_id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownClause(clause_id.to_string()))
    }

    pub fn family(&self, family_id: &str) -> Result<FamilySignature, RegistryError> {
        self.families()
            .into_iter()
            .find(|f| f.family_id == family_id)
            .ok_or_else(|| RegistryError::UnknownFamily(family_id.to_string()))
    }

    /// Idempotent upsert into the overlay; visible to all subsequent lookups.
    pub fn register_clause(&self, def: ClauseDefinition) {
        self.overlay
            .write()
            .clauses
            .insert(def.clause_id.clone(), def);
    }

    /// Idempotent upsert into the overlay; visible to all subsequent lookups.
    pub fn register_family(&self, sig: FamilySignature) {
        let mut overlay = self.overlay.write();
        match overlay
            .families
            .iter_mut()
            .find(|f| f.family_id == sig.family_id)
        {
            Some(slot) => *slot = sig,
            None => overlay.families.push(sig),
        }
    }

    /// Classify a document by counting family anchors (case-insensitive
    /// substring match). Highest score > 0 wins; ties break by
    /// first-registered order; no match ⇒ `"unknown"`.
    pub fn detect_family(&self, text: &str) -> DetectedFamily {
        let haystack = text.to_lowercase();
        let mut best: Option<(usize, &FamilySignature)> = None;
        let families = self.families();
        for fam in &families {
            let score = fam
                .anchors
                .iter()
                .filter(|a| haystack.contains(&a.to_lowercase()))
                .count();
            if score > 0 && best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, fam));
            }
        }
        match best {
            Some((score, fam)) => DetectedFamily {
                family_id: fam.family_id.clone(),
                score,
            },
            None => DetectedFamily::unknown(),
        }
    }

    /// Expand a family's expected-clause list into per-clause requirement
    /// records, deriving `required` vs `expected` from each clause's category.
    ///
    /// Expected clause ids without a definition fall back to `expected` with
    /// an operational category rather than failing the whole expansion; the
    /// completeness validator surfaces them as ordinary findings.
    pub fn family_requirements(
        &self,
        family_id: &str,
    ) -> Result<Vec<ClauseRequirement>, RegistryError> {
        let fam = self.family(family_id)?;
        let defs = self.definitions();
        Ok(fam
            .expected_clauses
            .iter()
            .map(|id| match defs.get(id) {
                Some(def) => ClauseRequirement {
                    clause_id: id.clone(),
                    level: def.requirement(),
                    category: def.category,
                },
                None => ClauseRequirement {
                    clause_id: id.clone(),
                    level: RequirementLevel::Expected,
                    category: ClauseCategory::Operational,
                },
            })
            .collect())
    }

    // ------------------------------------------------------------------
    // Overlay persistence
    // ------------------------------------------------------------------

    /// Snapshot the overlay as a versioned file payload.
    pub fn overlay_snapshot(&self) -> OverlayFileV1 {
        let overlay = self.overlay.read();
        OverlayFileV1 {
            version: OVERLAY_FILE_VERSION_V1,
            clauses: overlay.clauses.clone(),
            families: overlay.families.clone(),
        }
    }

    pub fn save_overlay(&self, path: &Path) -> Result<(), PersistError> {
        let payload = serde_json::to_string_pretty(&self.overlay_snapshot())?;
        std::fs::write(path, payload)?;
        Ok(())
    }

    /// Merge a previously saved overlay file into the live overlay.
    pub fn load_overlay(&self, path: &Path) -> Result<(), PersistError> {
        let contents = std::fs::read_to_string(path)?;
        let file: OverlayFileV1 = serde_json::from_str(&contents)?;
        for (_, def) in file.clauses {
            self.register_clause(def);
        }
        for fam in file.families {
            self.register_family(fam);
        }
        Ok(())
    }
}

/// Overlay persistence failure (io or format).
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("overlay io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("overlay format error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_catalog_is_consistent() {
        let reg = ClauseRegistry::new();
        let defs = reg.definitions();
        // Every expected clause id in every family should resolve.
        for fam in reg.families() {
            for id in &fam.expected_clauses {
                assert!(defs.contains_key(id), "family {} references unknown {id}", fam.family_id);
            }
        }
    }

    #[test]
    fn detect_family_scores_anchors() {
        let reg = ClauseRegistry::new();
        let text = "Sales Agreement for anhydrous ammonia. This is a long term \
                    supply arrangement; Seller shall deliver monthly cargoes.";
        let detected = reg.detect_family(text);
        assert_eq!(detected.family_id, "ammonia_sale_longterm");
        assert!(detected.score >= 2);
    }

    #[test]
    fn detect_family_unknown_when_no_anchor() {
        let reg = ClauseRegistry::new();
        let detected = reg.detect_family("lorem ipsum dolor sit amet");
        assert!(detected.is_unknown());
        assert_eq!(detected.score, 0);
    }

    #[test]
    fn detection_ties_break_by_registration_order() {
        let reg = ClauseRegistry::new();
        // Single shared anchor: both ammonia sale families mention ammonia.
        let detected = reg.detect_family("anhydrous ammonia");
        assert_eq!(detected.score, 1);
        assert_eq!(detected.family_id, "ammonia_sale_longterm");
    }

    #[test]
    fn family_requirements_derive_levels_from_category() {
        let reg = ClauseRegistry::new();
        let reqs = reg.family_requirements("ammonia_sale_longterm").unwrap();
        let get = |id: &str| reqs.iter().find(|r| r.clause_id == id).unwrap().level;
        assert_eq!(get("QUANTITY"), RequirementLevel::Required); // core
        assert_eq!(get("PRICE"), RequirementLevel::Required); // commercial
        assert_eq!(get("FORCE_MAJEURE"), RequirementLevel::Expected); // risk_allocation
        assert_eq!(get("INSPECTION"), RequirementLevel::Expected); // operational
    }

    #[test]
    fn unknown_family_is_an_error() {
        let reg = ClauseRegistry::new();
        assert_eq!(
            reg.family_requirements("potash_rail_spot").unwrap_err(),
            RegistryError::UnknownFamily("potash_rail_spot".to_string())
        );
    }

    #[test]
    fn overlay_wins_on_collision_and_is_idempotent() {
        let reg = ClauseRegistry::new();
        let mut custom = reg.definition("PRICE").unwrap();
        custom.anchors.push("basis nola".to_string());
        reg.register_clause(custom.clone());
        reg.register_clause(custom);
        let merged = reg.definitions();
        assert!(merged["PRICE"].anchors.contains(&"basis nola".to_string()));
    }

    #[test]
    fn runtime_family_registration_is_visible_immediately() {
        let reg = ClauseRegistry::new();
        reg.register_family(FamilySignature {
            family_id: "sulfur_sale_spot".to_string(),
            anchors: vec!["molten sulfur".to_string()],
            direction: obligo_model::Direction::Sale,
            term_type: obligo_model::TermType::Spot,
            transport_mode: "rail".to_string(),
            default_incoterm: "FOB".to_string(),
            expected_clauses: vec!["QUANTITY".to_string(), "PRICE".to_string()],
        });
        assert_eq!(
            reg.detect_family("cargo of molten sulfur").family_id,
            "sulfur_sale_spot"
        );
        assert_eq!(reg.family_requirements("sulfur_sale_spot").unwrap().len(), 2);
    }

    #[test]
    fn overlay_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.json");

        let reg = ClauseRegistry::new();
        reg.register_clause(ClauseDefinition {
            clause_id: "HEEL_RETENTION".to_string(),
            clause_type: obligo_model::ClauseType::Operational,
            category: obligo_model::ClauseCategory::Operational,
            anchors: vec!["heel".to_string()],
            extractable_fields: vec!["amount".to_string()],
            parameters: vec![],
            default_requirement: None,
        });
        reg.save_overlay(&path).unwrap();

        let fresh = ClauseRegistry::new();
        assert!(fresh.definition("HEEL_RETENTION").is_err());
        fresh.load_overlay(&path).unwrap();
        assert!(fresh.definition("HEEL_RETENTION").is_ok());
    }
}

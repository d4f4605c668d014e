//! Compiled base catalog: canonical clause definitions and contract family
//! signatures for the river-trading book (ammonia, urea, UAN).
//!
//! The overlay in [`crate::ClauseRegistry`] extends this set at runtime; the
//! catalog itself is immutable.

use crate::{ClauseDefinition, FamilySignature, RequirementLevel};
use obligo_model::{ClauseCategory, ClauseType, Direction, TermType};

fn def(
    id: &str,
    clause_type: ClauseType,
    category: ClauseCategory,
    anchors: &[&str],
    fields: &[&str],
    parameters: &[&str],
) -> ClauseDefinition {
    ClauseDefinition {
        clause_id: id.to_string(),
        clause_type,
        category,
        anchors: anchors.iter().map(|s| s.to_string()).collect(),
        extractable_fields: fields.iter().map(|s| s.to_string()).collect(),
        parameters: parameters.iter().map(|s| s.to_string()).collect(),
        default_requirement: None,
    }
}

/// The compiled clause definitions, in canonical order.
pub fn base_definitions() -> Vec<ClauseDefinition> {
    // `Legal`, `Compliance`, and `Operational` exist in both enums; only the
    // non-colliding clause types are glob-imported.
    use ClauseCategory::*;
    use ClauseType::{Condition, Delivery, Limit, Metadata, Obligation, Penalty, PriceTerm};
    vec![
        // -----------------------------------------------------------------
        // Core commercial obligations
        // -----------------------------------------------------------------
        def(
            "QUANTITY",
            Obligation,
            Core,
            &["contract quantity", "total quantity", "quantity of"],
            &["amount", "unit"],
            &["contract_quantity"],
        ),
        def(
            "QUANTITY_TOLERANCE",
            Limit,
            Commercial,
            &["tolerance", "more or less", "+/-", "at seller's option", "at buyer's option"],
            &["percent", "amount", "unit"],
            &["quantity_tolerance"],
        ),
        def(
            "MIN_MONTHLY_VOLUME",
            Obligation,
            Core,
            &["minimum monthly", "minimum quantity per month", "monthly minimum"],
            &["amount", "unit", "period"],
            &["volume_floor"],
        ),
        def(
            "TAKE_OR_PAY",
            Obligation,
            Core,
            &["take or pay", "take-or-pay", "minimum offtake"],
            &["amount", "unit", "percent"],
            &["volume_floor"],
        ),
        def(
            "PRICE",
            PriceTerm,
            Commercial,
            &["price per", "contract price", "purchase price", "sales price", "usd per"],
            &["amount", "currency", "unit"],
            &["nh3_price", "sell_stl", "sell_mem", "nola_buy"],
        ),
        def(
            "PRICE_ESCALATION",
            Condition,
            Determination,
            &["escalation", "price adjustment", "index-linked", "indexed to"],
            &["percent", "index"],
            &[],
        ),
        def(
            "PRICE_INDEX",
            Condition,
            Determination,
            &["tampa index", "argus", "icis", "published index", "index price"],
            &["index"],
            &[],
        ),
        // -----------------------------------------------------------------
        // Logistics
        // -----------------------------------------------------------------
        def(
            "DELIVERY_WINDOW",
            Delivery,
            Logistics,
            &["delivery window", "delivery period", "shipment period", "delivery shall"],
            &["start_date", "end_date", "period"],
            &[],
        ),
        def(
            "LAYCAN",
            Delivery,
            Logistics,
            &["laycan", "laydays", "canceling date"],
            &["start_date", "end_date"],
            &[],
        ),
        def(
            "DEMURRAGE",
            Penalty,
            Logistics,
            &["demurrage", "laytime"],
            &["amount", "currency", "period"],
            &[],
        ),
        def(
            "NOMINATION",
            ClauseType::Operational,
            Operational,
            &["nomination", "nominate", "vessel nomination", "barge nomination"],
            &["period"],
            &[],
        ),
        // -----------------------------------------------------------------
        // Risk / penalties
        // -----------------------------------------------------------------
        def(
            "SHORTFALL_PENALTY",
            Penalty,
            Risk,
            &["shortfall", "penalty of", "liquidated damages", "failure to deliver"],
            &["amount", "currency", "unit", "percent"],
            &[],
        ),
        def(
            "FORCE_MAJEURE",
            ClauseType::Legal,
            RiskAllocation,
            &["force majeure", "act of god", "beyond the reasonable control"],
            &[],
            &[],
        ),
        // -----------------------------------------------------------------
        // Credit / payment
        // -----------------------------------------------------------------
        def(
            "PAYMENT_TERMS",
            Condition,
            Credit,
            &["payment terms", "net 30", "net 15", "letter of credit", "telegraphic transfer"],
            &["days", "instrument"],
            &[],
        ),
        def(
            "CREDIT_LIMIT",
            Limit,
            Credit,
            &["credit limit", "open account limit", "exposure limit"],
            &["amount", "currency"],
            &[],
        ),
        // -----------------------------------------------------------------
        // Legal / compliance / documentation / operational
        // -----------------------------------------------------------------
        def(
            "GOVERNING_LAW",
            ClauseType::Legal,
            Legal,
            &["governing law", "governed by the laws", "jurisdiction"],
            &["jurisdiction"],
            &[],
        ),
        def(
            "ARBITRATION",
            ClauseType::Legal,
            Legal,
            &["arbitration", "arbitral tribunal", "dispute resolution"],
            &["forum"],
            &[],
        ),
        def(
            "COMPLIANCE_SANCTIONS",
            ClauseType::Compliance,
            Compliance,
            &["sanctions", "ofac", "export control", "anti-corruption"],
            &[],
            &[],
        ),
        def(
            "INSPECTION",
            ClauseType::Operational,
            Operational,
            &["inspection", "independent surveyor", "quality determination"],
            &["surveyor"],
            &[],
        ),
        def(
            "DOCUMENTATION",
            Metadata,
            Documentation,
            &["bill of lading", "certificate of origin", "shipping documents"],
            &[],
            &[],
        ),
    ]
}

fn family(
    id: &str,
    anchors: &[&str],
    direction: Direction,
    term_type: TermType,
    transport_mode: &str,
    default_incoterm: &str,
    expected: &[&str],
) -> FamilySignature {
    FamilySignature {
        family_id: id.to_string(),
        anchors: anchors.iter().map(|s| s.to_string()).collect(),
        direction,
        term_type,
        transport_mode: transport_mode.to_string(),
        default_incoterm: default_incoterm.to_string(),
        expected_clauses: expected.iter().map(|s| s.to_string()).collect(),
    }
}

/// The compiled family signatures. Order matters: family detection breaks
/// ties by first-registered order.
pub fn base_families() -> Vec<FamilySignature> {
    vec![
        family(
            "ammonia_sale_longterm",
            &["anhydrous ammonia", "long term", "sales agreement", "seller shall deliver"],
            Direction::Sale,
            TermType::LongTerm,
            "barge",
            "CFR",
            &[
                "QUANTITY",
                "QUANTITY_TOLERANCE",
                "MIN_MONTHLY_VOLUME",
                "PRICE",
                "PRICE_ESCALATION",
                "DELIVERY_WINDOW",
                "SHORTFALL_PENALTY",
                "PAYMENT_TERMS",
                "DEMURRAGE",
                "FORCE_MAJEURE",
                "GOVERNING_LAW",
                "INSPECTION",
            ],
        ),
        family(
            "ammonia_sale_spot",
            &["anhydrous ammonia", "spot sale", "single cargo", "one shipment"],
            Direction::Sale,
            TermType::Spot,
            "barge",
            "FOB",
            &[
                "QUANTITY",
                "PRICE",
                "LAYCAN",
                "PAYMENT_TERMS",
                "DEMURRAGE",
                "FORCE_MAJEURE",
                "GOVERNING_LAW",
            ],
        ),
        family(
            "ammonia_purchase_longterm",
            &["anhydrous ammonia", "purchase agreement", "buyer shall take", "supply agreement"],
            Direction::Purchase,
            TermType::LongTerm,
            "barge",
            "FOB",
            &[
                "QUANTITY",
                "QUANTITY_TOLERANCE",
                "TAKE_OR_PAY",
                "PRICE",
                "PRICE_INDEX",
                "DELIVERY_WINDOW",
                "PAYMENT_TERMS",
                "FORCE_MAJEURE",
                "GOVERNING_LAW",
                "COMPLIANCE_SANCTIONS",
            ],
        ),
        family(
            "ammonia_purchase_spot",
            &["anhydrous ammonia", "spot purchase", "prompt delivery"],
            Direction::Purchase,
            TermType::Spot,
            "barge",
            "FOB",
            &["QUANTITY", "PRICE", "LAYCAN", "PAYMENT_TERMS", "GOVERNING_LAW"],
        ),
        family(
            "urea_sale_spot",
            &["granular urea", "urea", "spot sale"],
            Direction::Sale,
            TermType::Spot,
            "barge",
            "FOB",
            &["QUANTITY", "PRICE", "LAYCAN", "PAYMENT_TERMS", "INSPECTION", "GOVERNING_LAW"],
        ),
        family(
            "uan_sale_longterm",
            &["uan solution", "urea ammonium nitrate", "long term"],
            Direction::Sale,
            TermType::LongTerm,
            "barge",
            "CFR",
            &[
                "QUANTITY",
                "QUANTITY_TOLERANCE",
                "PRICE",
                "PRICE_ESCALATION",
                "DELIVERY_WINDOW",
                "SHORTFALL_PENALTY",
                "PAYMENT_TERMS",
                "FORCE_MAJEURE",
                "GOVERNING_LAW",
            ],
        ),
    ]
}

/// Default requirement level derivation used when a definition does not pin
/// one explicitly.
pub fn requirement_for_category(category: ClauseCategory) -> RequirementLevel {
    if category.defaults_to_required() {
        RequirementLevel::Required
    } else {
        RequirementLevel::Expected
    }
}

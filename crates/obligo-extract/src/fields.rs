//! Field extraction helpers: amounts, percentages, units, penalty rates,
//! recurrence periods.

use regex::Regex;
use std::sync::OnceLock;

/// A numeric amount with the unit it was quoted in, when one was attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    pub value: f64,
    pub unit: Option<String>,
}

fn currency_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:usd|us\$|\$)\s*([\d,]+(?:\.\d+)?)").unwrap())
}

fn quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)([\d,]+(?:\.\d+)?)\s*(metric tons?|short tons?|mt\b|kt\b|tons?|tonnes?|bbl|barrels?)")
            .unwrap()
    })
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([\d.]+)\s*(?:%|percent)").unwrap())
}

fn rate_per_unit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:usd|us\$|\$)\s*([\d,]+(?:\.\d+)?)\s*(?:per|/)\s*(metric ton|short ton|mt\b|ton|tonne|day)",
        )
        .unwrap()
    })
}

fn penalty_cap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:capped at|cap of|not (?:to )?exceed(?:ing)?)\s*(?:usd|us\$|\$)?\s*([\d,]+(?:\.\d+)?)")
            .unwrap()
    })
}

fn index_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(tampa index|argus|icis|published index|index price|market index)").unwrap()
    })
}

fn parse_number(s: &str) -> Option<f64> {
    s.replace(',', "").parse::<f64>().ok()
}

/// First money amount in the text (`$400`, `USD 15.50`).
pub fn currency_amount(text: &str) -> Option<f64> {
    currency_amount_re()
        .captures(text)
        .and_then(|c| parse_number(&c[1]))
}

/// First quantity with a volume unit (`5,000 MT`, `60000 metric tons`).
pub fn quantity(text: &str) -> Option<Amount> {
    quantity_re().captures(text).and_then(|c| {
        Some(Amount {
            value: parse_number(&c[1])?,
            unit: Some(normalize_unit(&c[2])),
        })
    })
}

/// First percentage (`5%`, `7.5 percent`).
pub fn percent(text: &str) -> Option<f64> {
    percent_re().captures(text).and_then(|c| parse_number(&c[1]))
}

/// First per-unit money rate (`$15 per ton`, `USD 2,500/day`).
pub fn rate_per_unit(text: &str) -> Option<Amount> {
    rate_per_unit_re().captures(text).and_then(|c| {
        Some(Amount {
            value: parse_number(&c[1])?,
            unit: Some(normalize_unit(&c[2])),
        })
    })
}

/// Cap phrasing attached to a penalty (`capped at $250,000`).
pub fn penalty_cap(text: &str) -> Option<f64> {
    penalty_cap_re()
        .captures(text)
        .and_then(|c| parse_number(&c[1]))
}

/// Index-reference phrase, when price is determined by publication rather
/// than a number (downgrades PRICE confidence to medium, not low).
pub fn index_reference(text: &str) -> Option<String> {
    index_reference_re()
        .captures(text)
        .map(|c| c[1].to_lowercase())
}

/// Recurrence period from keyword patterns.
pub fn period(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let table: &[(&[&str], &str)] = &[
        (&["per month", "monthly", "each month", "/month"], "per_month"),
        (&["per quarter", "quarterly"], "per_quarter"),
        (&["per year", "per annum", "annually", "yearly"], "per_year"),
        (&["per shipment", "per cargo", "each cargo"], "per_shipment"),
        (&["per day", "daily", "/day"], "per_day"),
    ];
    for (needles, canonical) in table {
        if needles.iter().any(|n| lower.contains(n)) {
            return Some((*canonical).to_string());
        }
    }
    None
}

fn normalize_unit(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "metric ton" | "metric tons" | "tonne" | "tonnes" | "mt" => "MT".to_string(),
        "kt" => "KT".to_string(),
        "ton" | "tons" | "short ton" | "short tons" => "tons".to_string(),
        "bbl" | "barrel" | "barrels" => "bbl".to_string(),
        "day" => "day".to_string(),
        other => other.to_string(),
    }
}

/// Payment-term day counts (`net 30`, `within 15 days`).
pub fn payment_days(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)(?:net\s*(\d{1,3})|within\s*(\d{1,3})\s*days|(\d{1,3})\s*days after)")
            .unwrap()
    });
    re.captures(text).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .or_else(|| c.get(3))
            .and_then(|m| m.as_str().parse().ok())
    })
}

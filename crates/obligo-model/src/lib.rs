//! Obligo core data model
//!
//! Shared vocabulary for the whole pipeline:
//!
//! ```text
//! text ──► extraction ──► Vec<Clause> ──► validation ──► store ──► gates ──► bridge
//! ```
//!
//! Everything downstream of extraction speaks in terms of these records:
//! - [`Clause`] — one extracted contractual provision with a canonical id,
//!   optional numeric bound, and confidence
//! - [`Contract`] — a versioned, reviewable collection of clauses keyed by
//!   (counterparty, product group)
//! - [`ContractStatus`] — the review state machine, with legal transitions as
//!   an explicit table rather than scattered branches
//!
//! Every type here serializes with serde; the store and external adapters
//! persist these shapes as-is.

pub mod clause;
pub mod contract;

pub use clause::*;
pub use contract::*;

/// Normalize a counterparty name for identity purposes.
///
/// Trims, collapses internal whitespace, and uppercases so that
/// `"CF  Industries "` and `"cf industries"` resolve to the same identity key.
pub fn normalize_counterparty(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

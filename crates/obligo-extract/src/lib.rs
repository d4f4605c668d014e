//! Obligo extraction engine
//!
//! Turns normalized contract text into typed [`Clause`](obligo_model::Clause)
//! records:
//!
//! ```text
//! text ──► segment ──► match rules ──► extract fields ──► dedup ──► clauses
//!              │            │                │
//!          headings     first match      amounts / %,          + warnings
//!          merged       wins, most-      units, periods        + detected
//!          with body    specific first                           family
//! ```
//!
//! Contracts are not XML: a clause's anchor usually sits in a heading and its
//! operative values in the body below it, phrased a dozen different ways. A
//! first-match-wins rule list with post-hoc deduplication is simpler and more
//! auditable than a grammar, and every clause keeps its verbatim source span
//! for human review.
//!
//! The engine is pure and stateless per document; [`batch`] fans documents
//! out over a bounded worker pool. [`llm`] accepts the external extractor's
//! JSON payload, which has the same clause shape, so both paths feed
//! validation/gating/bridging interchangeably.

pub mod batch;
pub mod engine;
pub mod fields;
pub mod llm;
pub mod rules;
pub mod segment;

pub use engine::{ExtractionEngine, ExtractionOutcome};
pub use llm::{ExtractServiceError, LlmConfig, LlmPayload};

/// Normalize raw document text before segmentation: line endings, smart
/// quotes folded to ASCII, exotic spaces collapsed.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.replace("\r\n", "\n").replace('\r', "\n").chars() {
        match ch {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{00A0}' | '\u{2007}' | '\u{202F}' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

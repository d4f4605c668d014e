//! Section segmentation: blank-line paragraphs, heading detection, and
//! heading/body merging.

use regex::Regex;
use std::sync::OnceLock;

/// A merged document section. The heading (when present) carries the clause
/// anchor more often than the body, so rule matching runs over both.
#[derive(Debug, Clone)]
pub struct Section {
    pub heading: Option<String>,
    pub body: String,
    /// Reference label: explicit section/article/clause numbering when the
    /// heading carries one, positional fallback otherwise.
    pub section_ref: String,
    /// Position in document order; dedup sorts surviving clauses by this.
    pub index: usize,
}

impl Section {
    /// Heading and body joined, for anchor matching across the pair.
    pub fn text(&self) -> String {
        match &self.heading {
            Some(h) => format!("{}\n{}", h, self.body),
            None => self.body.clone(),
        }
    }
}

const HEADING_MAX_LEN: usize = 120;

fn numbered_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(section|article|clause)\s+(\d+(?:\.\d+)*)|(\d+(?:\.\d+)*)[.)\s])")
            .unwrap()
    })
}

/// A paragraph is a heading if it is short and either carries explicit
/// numbering/section labels or is entirely upper-case.
pub fn is_heading(paragraph: &str) -> bool {
    let p = paragraph.trim();
    if p.is_empty() || p.chars().count() >= HEADING_MAX_LEN {
        return false;
    }
    if numbered_heading_re().is_match(p) {
        return true;
    }
    let has_letters = p.chars().any(|c| c.is_alphabetic());
    has_letters && !p.chars().any(|c| c.is_lowercase())
}

/// Derive a section reference from a heading, falling back to position.
fn section_ref(heading: Option<&str>, index: usize) -> String {
    if let Some(h) = heading {
        if let Some(caps) = numbered_heading_re().captures(h.trim()) {
            let number = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if !number.is_empty() {
                let prefix = match caps.get(1).map(|m| m.as_str().to_lowercase()) {
                    Some(label) if label == "article" => "art",
                    Some(label) if label == "clause" => "cl",
                    _ => "sec",
                };
                return format!("{}_{}", prefix, number);
            }
        }
    }
    format!("para_{}", index)
}

/// Split normalized text on blank-line runs and merge heading/body pairs:
/// consecutive non-heading paragraphs after a heading join that heading's
/// section; leading body paragraphs with no heading stand alone.
pub fn segment(text: &str) -> Vec<Section> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    let mut sections: Vec<Section> = Vec::new();
    let mut open_heading = false;

    for para in paragraphs {
        if is_heading(para) {
            let index = sections.len();
            sections.push(Section {
                heading: Some(para.to_string()),
                body: String::new(),
                section_ref: section_ref(Some(para), index),
                index,
            });
            open_heading = true;
        } else if open_heading {
            let current = sections.last_mut().unwrap();
            if !current.body.is_empty() {
                current.body.push_str("\n\n");
            }
            current.body.push_str(para);
        } else {
            let index = sections.len();
            sections.push(Section {
                heading: None,
                body: para.to_string(),
                section_ref: section_ref(None, index),
                index,
            });
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_numbered_and_uppercase_headings() {
        assert!(is_heading("Section 4.2 Price"));
        assert!(is_heading("ARTICLE 7"));
        assert!(is_heading("3.1 Quantity Tolerance"));
        assert!(is_heading("FORCE MAJEURE"));
        assert!(!is_heading("The price shall be USD 400 per metric ton."));
        assert!(!is_heading(&"LONG ".repeat(40)));
    }

    #[test]
    fn heading_length_counts_characters_not_bytes() {
        // 110 characters but well over 120 bytes.
        let heading = format!("ARTICLE 7 {}", "É".repeat(100));
        assert!(is_heading(&heading));
        assert!(!is_heading(&"É ".repeat(80)));
    }

    #[test]
    fn merges_body_paragraphs_under_heading() {
        let text = "Section 4. Price\n\nThe price shall be USD 400 per MT.\n\nPrice is firm for the term.\n\nSection 5. Quantity\n\nTotal quantity 60,000 MT.";
        let sections = segment(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_ref, "sec_4");
        assert!(sections[0].body.contains("firm for the term"));
        assert_eq!(sections[1].section_ref, "sec_5");
    }

    #[test]
    fn leading_paragraphs_without_heading_stand_alone() {
        let text = "This Agreement is made between A and B.\n\nSECTION 1. QUANTITY\n\nBody.";
        let sections = segment(text);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[0].section_ref, "para_0");
        assert_eq!(sections[1].section_ref, "sec_1");
    }

    #[test]
    fn article_and_clause_labels_get_their_own_prefix() {
        let sections = segment("Article 7 Force Majeure\n\nNeither party...\n\nClause 9 Governing Law\n\nNew York law applies.");
        assert_eq!(sections[0].section_ref, "art_7");
        assert_eq!(sections[1].section_ref, "cl_9");
    }
}

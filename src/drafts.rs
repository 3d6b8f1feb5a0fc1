//! Draft intake auto-population.
//!
//! Incoming drafts usually arrive with a title and a body and little else.
//! Before a work item enters review, the missing editorial metadata is
//! derived from the content itself: a URL slug, an excerpt, a category and
//! tag set from keyword matching, reading time, and SEO title/description.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const EXCERPT_MAX_LEN: usize = 160;
const SEO_TITLE_MAX_LEN: usize = 60;
const WORDS_PER_MINUTE: usize = 225;
const MAX_TAGS: usize = 5;

static NON_SLUG_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static REPEATED_DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());
static MARKDOWN_SYNTAX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[#*`\[\]()]").unwrap());

/// (category, trigger keywords); first match wins, checked in order.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("Tutorials", &["how to", "guide", "tutorial", "step by step", "walkthrough"]),
    ("Product Updates", &["release", "changelog", "new feature", "update", "launch"]),
    ("Case Studies", &["case study", "customer", "success story", "results"]),
    ("Industry News", &["news", "announcement", "report", "trend", "survey"]),
];

const FALLBACK_CATEGORY: &str = "Editorial";

const TAG_VOCABULARY: &[&str] = &[
    "content marketing",
    "seo",
    "product",
    "engineering",
    "design",
    "analytics",
    "growth",
    "tutorial",
    "best practices",
    "case study",
    "announcement",
    "open source",
];

/// Editorial metadata derived from a draft's title and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMetadata {
    pub slug: String,
    pub excerpt: String,
    pub category: String,
    pub tags: Vec<String>,
    pub reading_time_minutes: u32,
    pub seo_title: String,
    pub seo_description: String,
    pub word_count: u32,
}

impl DraftMetadata {
    pub fn derive(title: &str, body: &str) -> Self {
        let excerpt = extract_excerpt(body);
        let seo_description = if !excerpt.is_empty() && excerpt.len() <= EXCERPT_MAX_LEN {
            excerpt.clone()
        } else {
            truncate(&format!("Learn about {}.", title.to_lowercase()), EXCERPT_MAX_LEN)
        };

        Self {
            slug: slugify(title),
            excerpt,
            category: categorize(title, body),
            tags: extract_tags(title, body),
            reading_time_minutes: reading_time_minutes(body),
            seo_title: seo_title(title),
            seo_description,
            word_count: body.split_whitespace().count() as u32,
        }
    }
}

/// URL-friendly slug: lowercase, alphanumerics and dashes only.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lowered, "");
    let dashed = WHITESPACE.replace_all(cleaned.trim(), "-");
    let collapsed = REPEATED_DASHES.replace_all(&dashed, "-");
    collapsed.trim_matches('-').to_string()
}

/// First sentences of the body that fit under the excerpt cap, with
/// markdown syntax stripped.
fn extract_excerpt(body: &str) -> String {
    let clean = MARKDOWN_SYNTAX.replace_all(body, "");
    let mut excerpt = String::new();

    for sentence in clean.split('.') {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if excerpt.len() + sentence.len() + 1 >= EXCERPT_MAX_LEN {
            break;
        }
        excerpt.push_str(sentence);
        excerpt.push('.');
    }

    excerpt.trim().to_string()
}

fn categorize(title: &str, body: &str) -> String {
    let text = format!("{} {}", title, body).to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|keyword| text.contains(keyword)) {
            return (*category).to_string();
        }
    }
    FALLBACK_CATEGORY.to_string()
}

fn extract_tags(title: &str, body: &str) -> Vec<String> {
    let text = format!("{} {}", title, body).to_lowercase();
    TAG_VOCABULARY
        .iter()
        .filter(|tag| text.contains(*tag))
        .take(MAX_TAGS)
        .map(|tag| (*tag).to_string())
        .collect()
}

fn reading_time_minutes(body: &str) -> u32 {
    let words = body.split_whitespace().count();
    (words.div_ceil(WORDS_PER_MINUTE)).max(1) as u32
}

fn seo_title(title: &str) -> String {
    if title.len() <= SEO_TITLE_MAX_LEN {
        title.to_string()
    } else {
        truncate(title, SEO_TITLE_MAX_LEN - 3) + "..."
    }
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_normalizes_title() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Multiple   Spaces --- Here  "), "multiple-spaces-here");
        assert_eq!(slugify("Already-slugged-title"), "already-slugged-title");
    }

    #[test]
    fn test_excerpt_respects_length_cap_and_strips_markdown() {
        let body = "# Heading\nThis is the *first* sentence. This is the second sentence. \
                    This third sentence is long enough that it will not fit in the excerpt \
                    once the first two have been taken because the cap is tight.";
        let excerpt = extract_excerpt(body);
        assert!(excerpt.len() < EXCERPT_MAX_LEN);
        assert!(excerpt.contains("first sentence"));
        assert!(!excerpt.contains('*'));
        assert!(!excerpt.contains('#'));
    }

    #[test]
    fn test_reading_time_minimum_one_minute() {
        assert_eq!(reading_time_minutes("just a few words"), 1);
        let long_body = "word ".repeat(450);
        assert_eq!(reading_time_minutes(&long_body), 2);
    }

    #[test]
    fn test_categorize_by_keyword() {
        assert_eq!(categorize("How to write better posts", ""), "Tutorials");
        assert_eq!(categorize("Q3 release notes", "changelog inside"), "Product Updates");
        assert_eq!(categorize("Thoughts on writing", "no trigger words"), "Editorial");
    }

    #[test]
    fn test_seo_title_truncation() {
        let short = "A short title";
        assert_eq!(seo_title(short), short);

        let long = "An exceedingly long title that certainly exceeds the sixty character limit for SEO";
        let result = seo_title(long);
        assert!(result.len() <= SEO_TITLE_MAX_LEN);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_derive_populates_all_fields() {
        let metadata = DraftMetadata::derive(
            "How to improve your content marketing",
            "A guide to better content marketing. Start with analytics and grow from there.",
        );

        assert_eq!(metadata.slug, "how-to-improve-your-content-marketing");
        assert_eq!(metadata.category, "Tutorials");
        assert!(metadata.tags.contains(&"content marketing".to_string()));
        assert_eq!(metadata.reading_time_minutes, 1);
        assert!(!metadata.excerpt.is_empty());
        assert!(metadata.word_count > 0);
    }
}

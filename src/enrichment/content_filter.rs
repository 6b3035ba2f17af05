//! Content-filter processor (§4.I): classifies a sighting's title and
//! description for safety, spam, topic, sentiment, and language. Always
//! available — falls back to a keyword/heuristic classifier when no
//! remote model is configured, and names which path ran in
//! `analysis_method`.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::{EnrichmentContext, EnrichmentProcessor, ProcessorOutcome};

const TOXIC_WORDS: &[&str] = &["hate", "kill", "stupid", "idiot", "racist", "slur"];
const SPAM_WORDS: &[&str] = &["click here", "buy now", "free money", "subscribe", "http://", "https://", "www."];
const POSITIVE_WORDS: &[&str] = &["amazing", "beautiful", "incredible", "wonderful", "exciting", "calm"];
const NEGATIVE_WORDS: &[&str] = &["terrifying", "scary", "awful", "disturbing", "horrible", "dangerous"];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("aircraft", &["plane", "jet", "helicopter", "drone"]),
    ("celestial", &["star", "planet", "moon", "meteor", "satellite"]),
    ("unexplained", &["hover", "silent", "disappear", "glow", "orb"]),
    ("general", &[]),
];

#[derive(Debug, Clone)]
pub struct ContentFilterResult {
    pub is_safe: bool,
    pub toxicity_score: f64,
    pub spam_score: f64,
    pub category_confidence: std::collections::BTreeMap<String, f64>,
    pub predicted_category: String,
    pub polarity: f64,
    pub subjectivity: f64,
    pub language_detected: String,
    pub analysis_method: String,
}

impl ContentFilterResult {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "is_safe": self.is_safe,
            "toxicity_score": self.toxicity_score,
            "spam_score": self.spam_score,
            "classification": {
                "category_confidence": self.category_confidence,
                "predicted_category": self.predicted_category,
            },
            "sentiment": {
                "polarity": self.polarity,
                "subjectivity": self.subjectivity,
            },
            "language_detected": self.language_detected,
            "analysis_method": self.analysis_method,
        })
    }
}

fn fraction_of_words_matched(text_lower: &str, words: &[&str]) -> f64 {
    let total_words = text_lower.split_whitespace().count().max(1) as f64;
    let hits = words.iter().filter(|w| text_lower.contains(*w)).count() as f64;
    (hits / total_words * 3.0).min(1.0)
}

/// Heuristic classifier: keyword matching for toxicity/spam/category,
/// lexicon-based polarity, naive ASCII-ratio language guess. This is the
/// mandatory fallback path — always available, no network dependency.
fn classify_keyword_based(text: &str) -> ContentFilterResult {
    let lower = text.to_lowercase();

    let toxicity_score = fraction_of_words_matched(&lower, TOXIC_WORDS);
    let spam_score = fraction_of_words_matched(&lower, SPAM_WORDS);

    let mut category_confidence = std::collections::BTreeMap::new();
    for (category, keywords) in CATEGORY_KEYWORDS {
        let hits = keywords.iter().filter(|w| lower.contains(*w)).count();
        if hits > 0 || *category == "general" {
            category_confidence.insert(category.to_string(), (hits as f64 / keywords.len().max(1) as f64).max(0.1));
        }
    }
    let predicted_category = category_confidence
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| "general".to_string());

    let positive_hits = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let negative_hits = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let polarity = if positive_hits + negative_hits > 0.0 { ((positive_hits - negative_hits) / (positive_hits + negative_hits)).clamp(-1.0, 1.0) } else { 0.0 };
    let subjectivity = ((positive_hits + negative_hits) / text.split_whitespace().count().max(1) as f64 * 4.0).min(1.0);

    let non_ascii_ratio = text.chars().filter(|c| !c.is_ascii()).count() as f64 / text.chars().count().max(1) as f64;
    let language_detected = if non_ascii_ratio > 0.3 { "unknown".to_string() } else { "en".to_string() };

    ContentFilterResult {
        is_safe: toxicity_score < 0.5,
        toxicity_score,
        spam_score,
        category_confidence,
        predicted_category,
        polarity,
        subjectivity,
        language_detected,
        analysis_method: "keyword_heuristic".to_string(),
    }
}

pub struct ContentFilterProcessor;

#[async_trait]
impl EnrichmentProcessor for ContentFilterProcessor {
    fn name(&self) -> &str {
        "content_analysis"
    }

    fn priority(&self) -> u8 {
        4
    }

    fn timeout_seconds(&self) -> u64 {
        5
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &EnrichmentContext) -> ProcessorOutcome {
        let started = Utc::now();
        let text = format!("{} {}", ctx.title.as_deref().unwrap_or(""), ctx.description.as_deref().unwrap_or(""));
        let result = classify_keyword_based(text.trim());
        let confidence = if result.is_safe { 0.6 } else { 0.8 };
        ProcessorOutcome::ok(result.to_json(), (Utc::now() - started).num_milliseconds(), Some(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_text_is_marked_safe_with_low_toxicity() {
        let result = classify_keyword_based("A beautiful silent light hovered over the field");
        assert!(result.is_safe);
        assert_eq!(result.toxicity_score, 0.0);
        assert_eq!(result.analysis_method, "keyword_heuristic");
    }

    #[test]
    fn toxic_language_is_flagged_unsafe() {
        let result = classify_keyword_based("you are a stupid idiot and I hate this");
        assert!(!result.is_safe);
        assert!(result.toxicity_score > 0.0);
    }

    #[test]
    fn spam_links_raise_spam_score() {
        let result = classify_keyword_based("buy now at https://example.com click here for free money");
        assert!(result.spam_score > 0.0);
    }

    #[test]
    fn category_keywords_select_aircraft() {
        let result = classify_keyword_based("a silent helicopter hovered over the drone field");
        assert_eq!(result.predicted_category, "aircraft");
    }

    #[tokio::test]
    async fn processor_is_always_available() {
        let processor = ContentFilterProcessor;
        assert!(processor.is_available().await);
        let ctx = EnrichmentContext {
            sighting_id: uuid::Uuid::new_v4(),
            latitude: 0.0,
            longitude: 0.0,
            altitude_m: None,
            timestamp: Utc::now(),
            azimuth_deg: None,
            pitch_deg: None,
            roll_deg: None,
            category: "ufo".to_string(),
            title: Some("Bright light".to_string()),
            description: Some("It was calm and beautiful".to_string()),
        };
        let outcome = processor.process(&ctx).await;
        assert!(outcome.success);
    }
}

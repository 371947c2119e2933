//! Review records as they move through the pipeline.
//!
//! raw (JSON store) -> cleaned -> labeled (CSV store)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Sentiment label derived from a 1-5 star prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// ">=4 positive, 3 neutral, <=2 negative"
    pub fn from_stars(stars: u8) -> Self {
        match stars {
            s if s >= 4 => Sentiment::Positive,
            3 => Sentiment::Neutral,
            _ => Sentiment::Negative,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Ok(Sentiment::Positive),
            "negative" | "neg" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("Unknown sentiment: {}", other)),
        }
    }
}

/// Region/language pair queried on the review source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub lang: String,
    pub country: String,
}

impl Locale {
    pub fn new(lang: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            country: country.into(),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lang, self.country)
    }
}

/// Review body as delivered by the source. Anything that is not a JSON
/// string is kept verbatim so the cleaner can default it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewText {
    Text(String),
    Other(serde_json::Value),
}

impl ReviewText {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ReviewText::Text(s) => Some(s),
            ReviewText::Other(_) => None,
        }
    }

    /// Text form used for the tabular store.
    pub fn to_cell(&self) -> String {
        match self {
            ReviewText::Text(s) => s.clone(),
            ReviewText::Other(v) => v.to_string(),
        }
    }
}

/// One fetched review. Field names follow the raw JSON store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReview {
    #[serde(default = "new_review_id")]
    pub review_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub content: Option<ReviewText>,
    /// Source-side star rating, not the model prediction.
    #[serde(default)]
    pub score: Option<u8>,
    #[serde(default)]
    pub thumbs_up_count: Option<u32>,
    /// ISO-8601 text.
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default)]
    pub reply_content: Option<String>,
    #[serde(default)]
    pub replied_at: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
}

fn new_review_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl RawReview {
    /// Minimal record, mostly for tests and ad-hoc input.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            review_id: new_review_id(),
            user_name: None,
            content: Some(ReviewText::Text(text.into())),
            score: None,
            thumbs_up_count: None,
            at: None,
            reply_content: None,
            replied_at: None,
            app_version: None,
            lang: None,
            country: None,
            app_id: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedReview {
    pub raw: RawReview,
    pub cleaned_content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledReview {
    pub cleaned: CleanedReview,
    pub sentiment: Sentiment,
}

impl LabeledReview {
    pub fn content(&self) -> String {
        self.cleaned
            .raw
            .content
            .as_ref()
            .map(|c| c.to_cell())
            .unwrap_or_default()
    }

    pub fn cleaned_content(&self) -> &str {
        &self.cleaned.cleaned_content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_thresholds() {
        assert_eq!(Sentiment::from_stars(5), Sentiment::Positive);
        assert_eq!(Sentiment::from_stars(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_stars(3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_stars(2), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(1), Sentiment::Negative);
    }

    #[test]
    fn test_raw_review_content_variants() {
        let json = r#"[
            {"reviewId": "a", "content": "Great ride", "score": 5, "at": "2024-05-01T10:00:00"},
            {"reviewId": "b", "content": null, "score": 1},
            {"reviewId": "c", "content": 42},
            {"reviewId": "d"}
        ]"#;
        let reviews: Vec<RawReview> = serde_json::from_str(json).unwrap();
        assert_eq!(reviews[0].text(), Some("Great ride"));
        assert_eq!(reviews[0].score, Some(5));
        assert!(reviews[1].content.is_none());
        assert_eq!(reviews[2].content, Some(ReviewText::Other(serde_json::json!(42))));
        assert_eq!(reviews[2].text(), None);
        assert!(reviews[3].content.is_none());
    }

    #[test]
    fn test_sentiment_parse() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!("neutral".parse::<Sentiment>().unwrap(), Sentiment::Neutral);
        assert!("mixed".parse::<Sentiment>().is_err());
    }
}

//! Sentiment labelling through a pretrained star-rating model.
//!
//! The model (nlptown/bert-base-multilingual-uncased-sentiment by default)
//! is served over HTTP; this module only talks to it. A prediction of
//! 1-5 stars collapses to negative / neutral / positive. Blank input never
//! reaches the model and a failed call is reported as `Unavailable`,
//! which the batch path coerces to neutral.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClassifierSettings;
use crate::models::Sentiment;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),

    #[error("unparseable star label: {0}")]
    UnparseableLabel(String),

    #[error("classifier failed to initialise: {0}")]
    Init(String),
}

/// Anything that turns text into a star label such as `"4 stars"`.
#[async_trait]
pub trait StarRatingModel: Send + Sync {
    async fn predict(&self, text: &str) -> Result<String, ClassifierError>;

    fn name(&self) -> &str;
}

/// Outcome of one classification attempt.
#[derive(Debug)]
pub enum Assessment {
    Rated { stars: u8, sentiment: Sentiment },
    /// Absent, non-text or whitespace-only input; the model was not called.
    Blank,
    Unavailable(ClassifierError),
}

impl Assessment {
    pub fn sentiment(&self) -> Sentiment {
        match self {
            Assessment::Rated { sentiment, .. } => *sentiment,
            Assessment::Blank | Assessment::Unavailable(_) => Sentiment::Neutral,
        }
    }
}

/// `"4 stars"` / `"1 star"` -> 4 / 1
pub fn parse_star_label(label: &str) -> Result<u8, ClassifierError> {
    label
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<u8>().ok())
        .ok_or_else(|| ClassifierError::UnparseableLabel(label.to_string()))
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Shared, read-only after construction. Build once per process and pass
/// it by reference (or `Arc`) to every call site.
pub struct SentimentClassifier {
    model: Arc<dyn StarRatingModel>,
    max_chars: usize,
    failures: AtomicU64,
}

impl SentimentClassifier {
    pub fn new(model: Arc<dyn StarRatingModel>, max_chars: usize) -> Self {
        Self {
            model,
            max_chars: max_chars.max(1),
            failures: AtomicU64::new(0),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Number of model calls that failed since construction.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn assess(&self, text: Option<&str>) -> Assessment {
        let text = match text {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Assessment::Blank,
        };

        let input = truncate_chars(text, self.max_chars);
        let result = match self.model.predict(input).await {
            Ok(label) => parse_star_label(&label),
            Err(e) => Err(e),
        };

        match result {
            Ok(stars) => Assessment::Rated {
                stars,
                sentiment: Sentiment::from_stars(stars),
            },
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let preview: String = text.chars().take(50).collect();
                warn!("Error classifying text '{}...': {}", preview, e);
                Assessment::Unavailable(e)
            }
        }
    }

    pub async fn classify(&self, text: Option<&str>) -> Sentiment {
        self.assess(text).await.sentiment()
    }

    /// Label every text, in input order. `concurrency` > 1 overlaps model
    /// calls but never reorders results.
    pub async fn classify_all<S: AsRef<str>>(
        &self,
        texts: &[Option<S>],
        concurrency: usize,
        label: &str,
    ) -> Vec<Sentiment> {
        let bar = ProgressBar::new(texts.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message(format!("Processing {}", label));

        let sentiments: Vec<Sentiment> = stream::iter(texts.iter())
            .map(|t| {
                let bar = bar.clone();
                async move {
                    let s = self.classify(t.as_ref().map(|s| s.as_ref())).await;
                    bar.inc(1);
                    s
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        bar.finish_and_clear();
        sentiments
    }
}

// ============================================================================
// HTTP inference backend
// ============================================================================

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
    Error { error: String },
}

/// Highest-scoring label of an inference response body.
fn top_label(body: &str) -> Result<String, ClassifierError> {
    let parsed: InferenceResponse = serde_json::from_str(body)
        .map_err(|e| ClassifierError::MalformedResponse(e.to_string()))?;

    let candidates = match parsed {
        InferenceResponse::Nested(mut outer) => {
            if outer.is_empty() {
                Vec::new()
            } else {
                outer.swap_remove(0)
            }
        }
        InferenceResponse::Flat(list) => list,
        InferenceResponse::Error { error } => {
            return Err(ClassifierError::MalformedResponse(error));
        }
    };

    candidates
        .into_iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
        .map(|c| c.label)
        .ok_or_else(|| ClassifierError::MalformedResponse("no labels in response".to_string()))
}

/// Request body; a cold endpoint holds the call until the model is loaded
/// instead of answering 503.
fn inference_request(text: &str) -> serde_json::Value {
    serde_json::json!({
        "inputs": text,
        "options": { "wait_for_model": true }
    })
}

/// Text-classification endpoint speaking the Hugging Face inference
/// protocol: `POST {"inputs": text}` -> `[[{"label": "5 stars", "score": ..}, ..]]`.
pub struct HttpStarModel {
    client: reqwest::Client,
    url: String,
    api_token: Option<String>,
    name: String,
}

impl HttpStarModel {
    /// Build the client and run one warm-up prediction. Any failure here
    /// is fatal for the caller: nothing downstream works without a model.
    pub async fn load(settings: &ClassifierSettings) -> Result<Self, ClassifierError> {
        info!("Initializing sentiment classifier at {}", settings.url);

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ClassifierError::Init(e.to_string()))?;

        let name = settings
            .url
            .split("/models/")
            .nth(1)
            .unwrap_or(settings.url.as_str())
            .to_string();

        let model = Self {
            client,
            url: settings.url.clone(),
            api_token: settings.api_token.clone(),
            name,
        };

        let label = model
            .predict("good")
            .await
            .map_err(|e| ClassifierError::Init(e.to_string()))?;
        parse_star_label(&label).map_err(|e| ClassifierError::Init(e.to_string()))?;

        info!("Classifier initialized successfully ({})", model.name);
        Ok(model)
    }
}

#[async_trait]
impl StarRatingModel for HttpStarModel {
    async fn predict(&self, text: &str) -> Result<String, ClassifierError> {
        let mut req = self
            .client
            .post(&self.url)
            .json(&inference_request(text));
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClassifierError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let label = top_label(&body)?;
        debug!("Model label: {}", label);
        Ok(label)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::ReviewText;
    use std::sync::atomic::AtomicUsize;

    /// Scripted model: answers with a fixed star count, or fails.
    pub(crate) struct FixedStars {
        pub stars: Option<u8>,
        pub calls: AtomicUsize,
    }

    impl FixedStars {
        pub(crate) fn new(stars: Option<u8>) -> Self {
            Self {
                stars,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StarRatingModel for FixedStars {
        async fn predict(&self, _text: &str) -> Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.stars {
                Some(1) => Ok("1 star".to_string()),
                Some(n) => Ok(format!("{} stars", n)),
                None => Err(ClassifierError::MalformedResponse("scripted failure".to_string())),
            }
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    /// Star count is the number of `+` characters in the text, min 1.
    pub(crate) struct PlusCounter;

    #[async_trait]
    impl StarRatingModel for PlusCounter {
        async fn predict(&self, text: &str) -> Result<String, ClassifierError> {
            let n = text.matches('+').count().clamp(1, 5);
            Ok(format!("{} stars", n))
        }

        fn name(&self) -> &str {
            "plus-counter"
        }
    }

    #[tokio::test]
    async fn test_blank_inputs_skip_model() {
        let model = Arc::new(FixedStars::new(Some(5)));
        let classifier = SentimentClassifier::new(model.clone(), 512);

        assert_eq!(classifier.classify(Some("")).await, Sentiment::Neutral);
        assert_eq!(classifier.classify(Some("   \n")).await, Sentiment::Neutral);
        assert_eq!(classifier.classify(None).await, Sentiment::Neutral);
        let number = ReviewText::Other(serde_json::json!(42));
        assert_eq!(classifier.classify(number.as_str()).await, Sentiment::Neutral);

        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(classifier.assess(None).await, Assessment::Blank));
    }

    #[tokio::test]
    async fn test_star_mapping() {
        for (stars, expected) in [
            (5, Sentiment::Positive),
            (3, Sentiment::Neutral),
            (1, Sentiment::Negative),
        ] {
            let classifier = SentimentClassifier::new(Arc::new(FixedStars::new(Some(stars))), 512);
            assert_eq!(classifier.classify(Some("some review")).await, expected);
        }
    }

    #[tokio::test]
    async fn test_failure_is_neutral_and_counted() {
        let classifier = SentimentClassifier::new(Arc::new(FixedStars::new(None)), 512);
        let outcome = classifier.assess(Some("the app crashed")).await;
        assert!(matches!(outcome, Assessment::Unavailable(_)));
        assert_eq!(outcome.sentiment(), Sentiment::Neutral);
        assert_eq!(classifier.classify(Some("again")).await, Sentiment::Neutral);
        assert_eq!(classifier.failure_count(), 2);
    }

    #[tokio::test]
    async fn test_classify_all_keeps_order() {
        let classifier = SentimentClassifier::new(Arc::new(PlusCounter), 512);
        let texts = vec![
            Some("+++++".to_string()),
            None,
            Some("+".to_string()),
            Some("+++".to_string()),
        ];
        let labels = classifier.classify_all(&texts, 3, "test").await;
        assert_eq!(
            labels,
            vec![
                Sentiment::Positive,
                Sentiment::Neutral,
                Sentiment::Negative,
                Sentiment::Neutral
            ]
        );
    }

    /// Records every input it receives, answers 4 stars.
    struct Recorder {
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StarRatingModel for Recorder {
        async fn predict(&self, text: &str) -> Result<String, ClassifierError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok("4 stars".to_string())
        }

        fn name(&self) -> &str {
            "recorder"
        }
    }

    #[tokio::test]
    async fn test_assess_truncates_model_input() {
        let model = Arc::new(Recorder {
            seen: std::sync::Mutex::new(Vec::new()),
        });
        let classifier = SentimentClassifier::new(model.clone(), 512);

        let long: String = "ዋጋ".chars().cycle().take(1000).collect();
        let outcome = classifier.assess(Some(&long)).await;
        assert!(matches!(outcome, Assessment::Rated { stars: 4, sentiment: Sentiment::Positive }));
        classifier.classify(Some("short review")).await;

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 512);
        assert!(long.starts_with(&seen[0]));
        assert_eq!(seen[1], "short review");
    }

    #[tokio::test]
    async fn test_load_fails_when_endpoint_unreachable() {
        let settings = ClassifierSettings {
            url: "http://127.0.0.1:9/models/nlptown/bert-base-multilingual-uncased-sentiment".to_string(),
            api_token: None,
            max_chars: 512,
            concurrency: 1,
            timeout: std::time::Duration::from_secs(5),
        };
        match HttpStarModel::load(&settings).await {
            Err(ClassifierError::Init(msg)) => assert!(!msg.is_empty()),
            Err(other) => panic!("expected Init error, got {}", other),
            Ok(_) => panic!("load succeeded against a closed port"),
        }
    }

    #[test]
    fn test_inference_request_waits_for_model() {
        let body = inference_request("driver late");
        assert_eq!(body["inputs"], "driver late");
        assert_eq!(body["options"]["wait_for_model"], true);
    }

    #[test]
    fn test_parse_star_label() {
        assert_eq!(parse_star_label("5 stars").unwrap(), 5);
        assert_eq!(parse_star_label("1 star").unwrap(), 1);
        assert!(parse_star_label("LABEL_0").is_err());
        assert!(parse_star_label("").is_err());
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("ዋጋ ውድ", 2), "ዋጋ");
        assert_eq!(truncate_chars("short", 512), "short");
    }

    #[test]
    fn test_top_label_shapes() {
        let nested = r#"[[{"label":"5 stars","score":0.7},{"label":"4 stars","score":0.2}]]"#;
        assert_eq!(top_label(nested).unwrap(), "5 stars");

        let flat = r#"[{"label":"1 star","score":0.1},{"label":"2 stars","score":0.8}]"#;
        assert_eq!(top_label(flat).unwrap(), "2 stars");

        let loading = r#"{"error":"Model is currently loading"}"#;
        assert!(matches!(top_label(loading), Err(ClassifierError::MalformedResponse(_))));

        assert!(top_label("not json").is_err());
        assert!(top_label("[]").is_err());
    }
}

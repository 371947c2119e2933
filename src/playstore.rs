//! Play Store review source.
//!
//! Reviews come from the store's `batchexecute` endpoint (rpc `UsvDTd`),
//! newest first, one page per request with a continuation token.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::models::{Locale, RawReview, ReviewText};

const BATCH_EXECUTE_URL: &str = "https://play.google.com/_/PlayStoreUi/data/batchexecute";
const RPC_ID: &str = "UsvDTd";
const SORT_NEWEST: u8 = 2;
/// The endpoint rejects larger pages.
pub const MAX_PAGE_SIZE: usize = 199;

/// Anything that can hand back up to `count` reviews for one app and locale.
#[async_trait]
pub trait ReviewSource: Send + Sync {
    async fn fetch(&self, app_id: &str, locale: &Locale, count: usize) -> Result<Vec<RawReview>>;
}

pub struct PlayStoreClient {
    client: reqwest::Client,
}

impl PlayStoreClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36")
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    async fn fetch_page(
        &self,
        app_id: &str,
        locale: &Locale,
        count: usize,
        token: Option<&str>,
    ) -> Result<(Vec<RawReview>, Option<String>)> {
        let url = format!("{}?hl={}&gl={}", BATCH_EXECUTE_URL, locale.lang, locale.country);
        let body = format!("f.req={}", urlencoding::encode(&request_payload(app_id, count, token)));

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-www-form-urlencoded;charset=UTF-8")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Request for {} ({}) failed", app_id, locale))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Play Store returned HTTP {} for {} ({})", status, app_id, locale));
        }

        let text = response.text().await.context("Failed to read Play Store response")?;
        parse_page(&text)
    }
}

#[async_trait]
impl ReviewSource for PlayStoreClient {
    async fn fetch(&self, app_id: &str, locale: &Locale, count: usize) -> Result<Vec<RawReview>> {
        let mut reviews: Vec<RawReview> = Vec::new();
        let mut token: Option<String> = None;

        while reviews.len() < count {
            let page_size = (count - reviews.len()).min(MAX_PAGE_SIZE);
            let (page, next) = self.fetch_page(app_id, locale, page_size, token.as_deref()).await?;
            debug!("Fetched page of {} reviews for {} ({})", page.len(), app_id, locale);

            let empty = page.is_empty();
            reviews.extend(page);
            match next {
                Some(t) if !empty => token = Some(t),
                _ => break,
            }
        }

        reviews.truncate(count);
        Ok(reviews)
    }
}

/// Inner JSON of the `f.req` form field.
fn request_payload(app_id: &str, count: usize, token: Option<&str>) -> String {
    let paging = match token {
        Some(t) => format!("[{},null,{}]", count, Value::String(t.to_string())),
        None => format!("[{},null,null]", count),
    };
    let inner = format!(
        "[null,null,[2,{},{},null,[]],[{},7]]",
        SORT_NEWEST,
        paging,
        Value::String(app_id.to_string())
    );
    serde_json::json!([[[RPC_ID, inner, null, "generic"]]]).to_string()
}

/// Parse one `batchexecute` response into reviews and the next-page token.
pub fn parse_page(body: &str) -> Result<(Vec<RawReview>, Option<String>)> {
    let json_start = body
        .find('[')
        .ok_or_else(|| anyhow!("Unexpected Play Store response: no JSON payload"))?;
    let envelope: Value = serde_json::from_str(body[json_start..].trim())
        .context("Failed to parse Play Store envelope")?;

    let inner = at_path(&envelope, &[0, 2])
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Play Store envelope carries no review payload"))?;
    let data: Value = serde_json::from_str(inner).context("Failed to parse review payload")?;

    let reviews = at_path(&data, &[0])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_review).collect())
        .unwrap_or_default();

    let token = at_path(&data, &[1])
        .and_then(Value::as_array)
        .and_then(|a| a.last())
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok((reviews, token))
}

fn at_path<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, &i| v.get(i))
}

fn string_at(value: &Value, path: &[usize]) -> Option<String> {
    at_path(value, path).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_at(value: &Value, path: &[usize]) -> Option<String> {
    at_path(value, path)
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn parse_review(item: &Value) -> Option<RawReview> {
    let review_id = string_at(item, &[0])?;

    let content = match at_path(item, &[4]) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(ReviewText::Text(s.clone())),
        Some(other) => Some(ReviewText::Other(other.clone())),
    };

    Some(RawReview {
        review_id,
        user_name: string_at(item, &[1, 0]),
        content,
        score: at_path(item, &[2]).and_then(Value::as_u64).map(|s| s as u8),
        thumbs_up_count: at_path(item, &[6]).and_then(Value::as_u64).map(|n| n as u32),
        at: timestamp_at(item, &[5, 0]),
        reply_content: string_at(item, &[7, 1]),
        replied_at: timestamp_at(item, &[7, 2, 0]),
        app_version: string_at(item, &[10]),
        lang: None,
        country: None,
        app_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(data: &Value) -> String {
        let outer = serde_json::json!([["wrb.fr", RPC_ID, data.to_string(), null, null, null, "generic"]]);
        format!(")]}}'\n\n{}", outer)
    }

    #[test]
    fn test_parse_page_fields_and_token() {
        let data = serde_json::json!([
            [
                ["gp:1", ["Abebe", null], 5, null, "Great ride, fair price", [1714557600, 0], 3,
                 [null, "Thanks!", [1714644000, 0]], null, null, "4.2.1"],
                ["gp:2", ["Sara", null], 1, null, null, [1714557600, 0], 0, null, null, null, null]
            ],
            [null, "NEXT_TOKEN"]
        ]);

        let (reviews, token) = parse_page(&envelope(&data)).unwrap();
        assert_eq!(token.as_deref(), Some("NEXT_TOKEN"));
        assert_eq!(reviews.len(), 2);

        let first = &reviews[0];
        assert_eq!(first.review_id, "gp:1");
        assert_eq!(first.user_name.as_deref(), Some("Abebe"));
        assert_eq!(first.text(), Some("Great ride, fair price"));
        assert_eq!(first.score, Some(5));
        assert_eq!(first.thumbs_up_count, Some(3));
        assert_eq!(first.at.as_deref(), Some("2024-05-01T10:00:00"));
        assert_eq!(first.reply_content.as_deref(), Some("Thanks!"));
        assert_eq!(first.replied_at.as_deref(), Some("2024-05-02T10:00:00"));
        assert_eq!(first.app_version.as_deref(), Some("4.2.1"));

        assert!(reviews[1].content.is_none());
        assert!(reviews[1].reply_content.is_none());
    }

    #[test]
    fn test_parse_last_page_has_no_token() {
        let data = serde_json::json!([[], [null]]);
        let (reviews, token) = parse_page(&envelope(&data)).unwrap();
        assert!(reviews.is_empty());
        assert!(token.is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_page("<html>blocked</html>").is_err());
        assert!(parse_page(")]}'\n\n[[\"wrb.fr\",\"UsvDTd\",null]]").is_err());
    }

    #[test]
    fn test_request_payload_shape() {
        let first = request_payload("com.feres.user", 199, None);
        let parsed: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(parsed[0][0][0], RPC_ID);
        let inner: Value = serde_json::from_str(parsed[0][0][1].as_str().unwrap()).unwrap();
        assert_eq!(inner[2][2][0], 199);
        assert_eq!(inner[3][0], "com.feres.user");

        let next = request_payload("com.feres.user", 50, Some("tok"));
        let parsed: Value = serde_json::from_str(&next).unwrap();
        let inner: Value = serde_json::from_str(parsed[0][0][1].as_str().unwrap()).unwrap();
        assert_eq!(inner[2][2][2], "tok");
    }
}

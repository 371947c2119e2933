//! Review collection with bounded retry per locale.

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::RetryPolicy;
use crate::models::{Locale, RawReview};
use crate::playstore::ReviewSource;

pub struct Collector<'a> {
    source: &'a dyn ReviewSource,
    retry: RetryPolicy,
}

impl<'a> Collector<'a> {
    pub fn new(source: &'a dyn ReviewSource, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Gather up to `target_count` reviews, walking `locales` in order.
    ///
    /// Each locale gets `max_retries` attempts at the remaining count; a
    /// locale that keeps failing is skipped. Never fails: the worst case
    /// is an empty list.
    pub async fn collect(&self, app_id: &str, locales: &[Locale], target_count: usize) -> Vec<RawReview> {
        let mut collected: Vec<RawReview> = Vec::new();
        let max_retries = self.retry.max_retries.max(1);

        for locale in locales {
            if collected.len() >= target_count {
                break;
            }

            for attempt in 1..=max_retries {
                let remaining = target_count - collected.len();
                match self.source.fetch(app_id, locale, remaining).await {
                    Ok(batch) => {
                        info!("📥 {} ({}): fetched {} reviews", app_id, locale, batch.len());
                        collected.extend(batch.into_iter().take(remaining).map(|mut r| {
                            r.lang = Some(locale.lang.clone());
                            r.country = Some(locale.country.clone());
                            r.app_id = Some(app_id.to_string());
                            r
                        }));
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "❌ Error scraping {} ({}), attempt {}/{}: {}",
                            app_id, locale, attempt, max_retries, e
                        );
                        if attempt < max_retries {
                            sleep(self.retry.backoff).await;
                        }
                    }
                }
            }
        }

        if collected.is_empty() {
            warn!("⚠️ No reviews collected for {}", app_id);
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Per-country script of outcomes; `Some(n)` returns `min(n, count)`
    /// reviews, `None` fails. Exhausted scripts fail.
    struct ScriptedSource {
        script: Mutex<HashMap<String, Vec<Option<usize>>>>,
        calls: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedSource {
        fn new(script: &[(&str, Vec<Option<usize>>)]) -> Self {
            Self {
                script: Mutex::new(
                    script
                        .iter()
                        .map(|(c, s)| (c.to_string(), s.iter().rev().copied().collect()))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReviewSource for ScriptedSource {
        async fn fetch(&self, _app_id: &str, locale: &Locale, count: usize) -> Result<Vec<RawReview>> {
            self.calls.lock().unwrap().push((locale.country.clone(), count));
            let next = self
                .script
                .lock()
                .unwrap()
                .get_mut(&locale.country)
                .and_then(|s| s.pop());
            match next {
                Some(Some(n)) => Ok((0..n.min(count))
                    .map(|i| RawReview::with_text(format!("{} review {}", locale.country, i)))
                    .collect()),
                _ => Err(anyhow!("network down")),
            }
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::ZERO,
        }
    }

    fn locales() -> Vec<Locale> {
        vec![Locale::new("en", "et"), Locale::new("en", "us")]
    }

    #[tokio::test]
    async fn test_stops_at_target() {
        let source = ScriptedSource::new(&[("et", vec![Some(10)]), ("us", vec![Some(10)])]);
        let reviews = Collector::new(&source, policy(3)).collect("com.feres.user", &locales(), 5).await;

        assert_eq!(reviews.len(), 5);
        assert_eq!(source.calls(), vec![("et".to_string(), 5)]);
        assert_eq!(reviews[0].country.as_deref(), Some("et"));
        assert_eq!(reviews[0].lang.as_deref(), Some("en"));
        assert_eq!(reviews[0].app_id.as_deref(), Some("com.feres.user"));
    }

    #[tokio::test]
    async fn test_retries_then_falls_through_with_remaining_count() {
        let source = ScriptedSource::new(&[("et", vec![None, Some(3)]), ("us", vec![Some(10)])]);
        let reviews = Collector::new(&source, policy(3)).collect("app", &locales(), 8).await;

        assert_eq!(reviews.len(), 8);
        assert_eq!(
            source.calls(),
            vec![("et".to_string(), 8), ("et".to_string(), 8), ("us".to_string(), 5)]
        );
        assert_eq!(reviews[7].country.as_deref(), Some("us"));
    }

    #[tokio::test]
    async fn test_exhausted_locale_is_skipped() {
        let source = ScriptedSource::new(&[("et", vec![None, None]), ("us", vec![Some(2)])]);
        let reviews = Collector::new(&source, policy(2)).collect("app", &locales(), 10).await;

        assert_eq!(reviews.len(), 2);
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_total_failure_is_empty_not_error() {
        let source = ScriptedSource::new(&[]);
        let reviews = Collector::new(&source, policy(3)).collect("app", &locales(), 10).await;

        assert!(reviews.is_empty());
        assert_eq!(source.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_backoff_between_failed_attempts() {
        let source = ScriptedSource::new(&[]);
        let retry = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(50),
        };
        let started = std::time::Instant::now();
        let reviews = Collector::new(&source, retry).collect("app", &locales(), 10).await;
        let elapsed = started.elapsed();

        assert!(reviews.is_empty());
        assert_eq!(source.calls().len(), 6);
        // two waits per locale, none after the last attempt
        assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
    }
}

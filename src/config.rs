//! Runtime settings.
//!
//! Everything is read from the environment (optionally seeded from `.env`):
//! - `TRACKED_APPS` as `key:Label:package_id` entries, comma separated
//! - locale targets via `REVIEW_LANG` + `REVIEW_COUNTRIES`
//! - retry/backoff, classifier endpoint and batch knobs
//! - store locations and the dashboard bind address

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::models::Locale;

pub const DEFAULT_TRACKED_APPS: &str =
    "ride:RIDE:com.multibrains.taxi.passenger.ridepassengeret,feres:Feres:com.feres.user";

pub const DEFAULT_CLASSIFIER_URL: &str =
    "https://api-inference.huggingface.co/models/nlptown/bert-base-multilingual-uncased-sentiment";

/// One application whose reviews are tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedApp {
    /// File-name key, e.g. `ride` -> `ride_reviews.json`
    pub key: String,
    /// Display label used in reports, e.g. `RIDE`
    pub label: String,
    /// Store package identifier
    pub package_id: String,
}

impl TrackedApp {
    /// Parse one `TRACKED_APPS` entry:
    /// - `key:Label:package_id`
    /// - `key:package_id` (label = upper-cased key)
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.trim().split(':').map(|p| p.trim()).collect();

        let (key, label, package_id) = match parts.as_slice() {
            [key, label, package] => (*key, label.to_string(), *package),
            [key, package] => (*key, key.to_uppercase(), *package),
            _ => return Err(format!("Invalid tracked app (expected key:Label:package): {}", s)),
        };

        if key.is_empty() || package_id.is_empty() || label.is_empty() {
            return Err(format!("Invalid tracked app (empty field): {}", s));
        }
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(format!("Invalid tracked app key: {}", key));
        }

        Ok(Self {
            key: key.to_string(),
            label,
            package_id: package_id.to_string(),
        })
    }

    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        let apps: Vec<Self> = s
            .split(',')
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(Self::parse)
            .collect::<Result<_, _>>()?;

        if apps.is_empty() {
            return Err("TRACKED_APPS is empty".to_string());
        }
        Ok(apps)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    pub url: String,
    pub api_token: Option<String>,
    pub max_chars: usize,
    pub concurrency: usize,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub apps: Vec<TrackedApp>,
    pub locales: Vec<Locale>,
    pub target_count: usize,
    pub retry: RetryPolicy,
    pub classifier: ClassifierSettings,
    pub top_n: usize,
    pub dashboard_addr: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        let apps = TrackedApp::parse_list(&env_string("TRACKED_APPS", DEFAULT_TRACKED_APPS))?;

        let lang = env_string("REVIEW_LANG", "en");
        let locales: Vec<Locale> = env_string("REVIEW_COUNTRIES", "et,us")
            .split(',')
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| Locale::new(lang.clone(), c))
            .collect();
        if locales.is_empty() {
            return Err("REVIEW_COUNTRIES is empty".to_string());
        }

        let api_token = std::env::var("HF_API_TOKEN").ok().filter(|t| !t.trim().is_empty());

        Ok(Self {
            data_dir: PathBuf::from(env_string("DATA_DIR", "data")),
            output_dir: PathBuf::from(env_string("OUTPUT_DIR", "outputs")),
            apps,
            locales,
            target_count: env_parse("REVIEW_TARGET_COUNT", 1000)?,
            retry: RetryPolicy {
                max_retries: env_parse::<u32>("FETCH_MAX_RETRIES", 3)?.max(1),
                backoff: Duration::from_secs(env_parse("FETCH_BACKOFF_SECS", 2)?),
            },
            classifier: ClassifierSettings {
                url: env_string("CLASSIFIER_URL", DEFAULT_CLASSIFIER_URL),
                api_token,
                max_chars: env_parse("CLASSIFIER_MAX_CHARS", 512)?,
                concurrency: env_parse::<usize>("CLASSIFIER_CONCURRENCY", 1)?.max(1),
                timeout: Duration::from_secs(env_parse("CLASSIFIER_TIMEOUT_SECS", 60)?),
            },
            top_n: env_parse("KEYWORDS_TOP_N", 20)?,
            dashboard_addr: env_string("DASHBOARD_ADDR", "0.0.0.0:3000"),
        })
    }

    pub fn raw_path(&self, app: &TrackedApp) -> PathBuf {
        raw_path(&self.data_dir, &app.key)
    }

    pub fn processed_path(&self, app: &TrackedApp) -> PathBuf {
        processed_path(&self.data_dir, &app.key)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("report.json")
    }
}

pub fn raw_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join("raw").join(format!("{}_reviews.json", key))
}

pub fn processed_path(data_dir: &Path, key: &str) -> PathBuf {
    data_dir.join("processed").join(format!("{}_cleaned.csv", key))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| format!("Invalid value for {}: {}", key, v)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_entry() {
        let app = TrackedApp::parse("ride:RIDE:com.multibrains.taxi.passenger.ridepassengeret").unwrap();
        assert_eq!(app.key, "ride");
        assert_eq!(app.label, "RIDE");
        assert_eq!(app.package_id, "com.multibrains.taxi.passenger.ridepassengeret");
    }

    #[test]
    fn test_parse_without_label() {
        let app = TrackedApp::parse("feres:com.feres.user").unwrap();
        assert_eq!(app.label, "FERES");
        assert_eq!(app.package_id, "com.feres.user");
    }

    #[test]
    fn test_parse_invalid_entries() {
        assert!(TrackedApp::parse("ride").is_err());
        assert!(TrackedApp::parse("ride::com.x").is_err());
        assert!(TrackedApp::parse("ri de:RIDE:com.x").is_err());
        assert!(TrackedApp::parse("a:b:c:d").is_err());
    }

    #[test]
    fn test_default_tracked_apps() {
        let apps = TrackedApp::parse_list(DEFAULT_TRACKED_APPS).unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].label, "RIDE");
        assert_eq!(apps[1].label, "Feres");
        assert_eq!(apps[1].key, "feres");
    }

    #[test]
    fn test_store_paths() {
        let dir = Path::new("data");
        assert_eq!(raw_path(dir, "ride"), Path::new("data/raw/ride_reviews.json"));
        assert_eq!(processed_path(dir, "feres"), Path::new("data/processed/feres_cleaned.csv"));
    }
}

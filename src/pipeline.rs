//! Batch stages. Each one walks every tracked app and persists its output
//! for the next: raw JSON -> cleaned CSV -> labelled CSV -> report.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::Settings;
use crate::models::{CleanedReview, LabeledReview, Sentiment};
use crate::playstore::ReviewSource;
use crate::preprocess;
use crate::report::{self, AppReviews, Report};
use crate::sentiment::SentimentClassifier;
use crate::store;
use crate::themes;

pub async fn run_collect(settings: &Settings, source: &dyn ReviewSource) -> Result<()> {
    info!("🚀 Starting collection for {} apps", settings.apps.len());
    let collector = Collector::new(source, settings.retry.clone());

    for app in &settings.apps {
        let reviews = collector
            .collect(&app.package_id, &settings.locales, settings.target_count)
            .await;
        if reviews.is_empty() {
            warn!("No reviews scraped for {}", app.key);
            continue;
        }

        let path = settings.raw_path(app);
        store::write_raw(&path, &reviews)?;
        info!("💾 Saved {} reviews for {} to {}", reviews.len(), app.key, path.display());
    }
    Ok(())
}

pub fn run_preprocess(settings: &Settings) -> Result<()> {
    info!("🧹 Starting preprocessing...");
    for app in &settings.apps {
        let raw_path = settings.raw_path(app);
        let raw = match store::read_raw(&raw_path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Skipping {}: {:#}", app.key, e);
                continue;
            }
        };
        info!("Loaded {} raw reviews for {}", raw.len(), app.key);

        let cleaned = preprocess::clean(raw);
        if cleaned.is_empty() {
            warn!("No reviews remain after cleaning for {}", app.key);
            continue;
        }

        let path = settings.processed_path(app);
        store::write_cleaned(&path, &cleaned)?;
        info!("💾 Saved processed data for {} to {}", app.key, path.display());
    }
    Ok(())
}

/// Attach a sentiment to every cleaned review, preserving order.
pub async fn label_reviews(
    classifier: &SentimentClassifier,
    cleaned: Vec<CleanedReview>,
    concurrency: usize,
    label: &str,
) -> Vec<LabeledReview> {
    let texts: Vec<Option<&str>> = cleaned.iter().map(|r| Some(r.cleaned_content.as_str())).collect();
    let sentiments = classifier.classify_all(&texts, concurrency, label).await;

    cleaned
        .into_iter()
        .zip(sentiments)
        .map(|(cleaned, sentiment)| LabeledReview { cleaned, sentiment })
        .collect()
}

pub async fn run_sentiment(settings: &Settings, classifier: &SentimentClassifier) -> Result<()> {
    info!("🧠 Starting sentiment analysis with {}", classifier.model_name());
    let failures_before = classifier.failure_count();

    for app in &settings.apps {
        let path = settings.processed_path(app);
        let cleaned = match store::read_cleaned(&path) {
            Ok(c) => c,
            Err(e) => {
                error!("Skipping {}: {:#}", app.key, e);
                continue;
            }
        };
        if cleaned.is_empty() {
            warn!("No reviews to analyze for {}", app.key);
            continue;
        }

        info!("Classifying sentiments for {} ({} reviews)...", app.key, cleaned.len());
        let labeled = label_reviews(classifier, cleaned, settings.classifier.concurrency, &app.label).await;
        store::write_labeled(&path, &labeled)?;
        info!("💾 Saved sentiment results for {} to {}", app.key, path.display());
    }

    let failures = classifier.failure_count() - failures_before;
    if failures > 0 {
        warn!("Classifier failed on {} reviews (labelled neutral)", failures);
    } else {
        info!("Classifier failures: 0");
    }
    Ok(())
}

/// Labelled reviews of every tracked app. A missing store yields an
/// empty set for that app.
pub fn load_labeled(settings: &Settings) -> Result<Vec<AppReviews>> {
    let mut apps = Vec::with_capacity(settings.apps.len());
    for app in &settings.apps {
        let path = settings.processed_path(app);
        let reviews = if path.exists() {
            store::read_labeled(&path)?
        } else {
            warn!("Processed file not found at {}", path.display());
            Vec::new()
        };
        apps.push(AppReviews {
            label: app.label.clone(),
            reviews,
        });
    }
    Ok(apps)
}

pub fn run_themes(settings: &Settings) -> Result<()> {
    info!("🏷️ Starting thematic analysis...");
    for app in load_labeled(settings)? {
        for sentiment in Sentiment::ALL {
            let keywords = report::keywords_for(&app.reviews, sentiment, settings.top_n);
            if keywords.is_empty() {
                info!("No {} reviews for keyword extraction in {}", sentiment, app.label);
                continue;
            }
            info!("{} {} themes:", app.label, sentiment);
            for (theme, kws) in themes::non_empty(themes::group_themes(&keywords)) {
                info!("  {}: {:?}", theme, kws);
            }
        }
    }
    Ok(())
}

pub fn run_report(settings: &Settings) -> Result<Report> {
    info!("📊 Building report...");
    let apps = load_labeled(settings)?;
    let report = Report::build(&apps, settings.top_n);

    for line in report.summary_lines() {
        info!("{}", line);
    }

    let path = settings.report_path();
    report.write_json(&path)?;
    info!("💾 Saved report to {}", path.display());
    Ok(report)
}

/// collect -> preprocess -> sentiment -> report
pub async fn run_all(
    settings: &Settings,
    source: &dyn ReviewSource,
    classifier: &SentimentClassifier,
) -> Result<Report> {
    run_collect(settings, source).await?;
    run_preprocess(settings)?;
    run_sentiment(settings, classifier).await?;
    run_report(settings)
}

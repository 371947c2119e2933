//! Aggregation across tracked apps: sentiment distributions, theme keyword
//! tables and per-theme winners. Everything here is recomputed on demand.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::info;
use utoipa::ToSchema;

use crate::models::{LabeledReview, Sentiment};
use crate::tfidf;
use crate::themes::{self, Theme, DICTIONARY_VERSION};

/// Labelled reviews of one tracked app, under its display label.
#[derive(Debug, Clone)]
pub struct AppReviews {
    pub label: String,
    pub reviews: Vec<LabeledReview>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SentimentSlice {
    pub sentiment: Sentiment,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SentimentDistribution {
    pub app: String,
    pub total: usize,
    pub slices: Vec<SentimentSlice>,
}

impl SentimentDistribution {
    pub fn from_reviews<'r>(app: &str, reviews: impl IntoIterator<Item = &'r LabeledReview>) -> Self {
        let mut counts: HashMap<Sentiment, usize> = HashMap::new();
        let mut total = 0usize;
        for review in reviews {
            *counts.entry(review.sentiment).or_insert(0) += 1;
            total += 1;
        }

        let slices = Sentiment::ALL
            .iter()
            .map(|s| {
                let count = counts.get(s).copied().unwrap_or(0);
                let percentage = if total == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total as f64
                };
                SentimentSlice {
                    sentiment: *s,
                    count,
                    percentage,
                }
            })
            .collect();

        Self {
            app: app.to_string(),
            total,
            slices,
        }
    }

    pub fn count(&self, sentiment: Sentiment) -> usize {
        self.slices
            .iter()
            .find(|s| s.sentiment == sentiment)
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ThemeAssignment {
    pub app: String,
    pub sentiment: Sentiment,
    pub theme: Theme,
    pub keyword_count: usize,
    pub keywords: Vec<String>,
}

/// Top TF-IDF terms of one app's reviews carrying `sentiment`.
pub fn keywords_for(reviews: &[LabeledReview], sentiment: Sentiment, top_n: usize) -> Vec<String> {
    let texts: Vec<&str> = reviews
        .iter()
        .filter(|r| r.sentiment == sentiment)
        .map(|r| r.cleaned_content())
        .filter(|t| !t.is_empty())
        .collect();
    tfidf::extract_keywords(&texts, top_n)
}

/// Theme x sentiment x app keyword counts. Only themes that received at
/// least one keyword appear.
pub fn theme_table(apps: &[AppReviews], top_n: usize) -> Vec<ThemeAssignment> {
    let mut table = Vec::new();
    for app in apps {
        for sentiment in Sentiment::ALL {
            let keywords = keywords_for(&app.reviews, sentiment, top_n);
            if keywords.is_empty() {
                info!("No {} reviews for keyword extraction in {}", sentiment, app.label);
                continue;
            }
            for (theme, kws) in themes::non_empty(themes::group_themes(&keywords)) {
                table.push(ThemeAssignment {
                    app: app.label.clone(),
                    sentiment,
                    theme,
                    keyword_count: kws.len(),
                    keywords: kws,
                });
            }
        }
    }
    table
}

fn count_in(table: &[ThemeAssignment], app: &str, sentiment: Sentiment, theme: Theme) -> usize {
    table
        .iter()
        .filter(|a| a.app == app && a.sentiment == sentiment && a.theme == theme)
        .map(|a| a.keyword_count)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Leader {
        app: String,
        count: usize,
        runner_up: Option<String>,
        runner_up_count: usize,
    },
    Tie {
        apps: Vec<String>,
        count: usize,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Leader {
                app,
                count,
                runner_up: Some(other),
                runner_up_count,
            } => write!(f, "{} outperforms {} ({} vs {} keywords)", app, other, count, runner_up_count),
            Outcome::Leader { app, count, .. } => write!(f, "{} leads ({} keywords)", app, count),
            Outcome::Tie { apps, count } => write!(f, "{} are equal ({} keywords)", apps.join(" and "), count),
        }
    }
}

/// Strictly highest count wins; a shared maximum is a tie.
pub fn decide(counts: &[(String, usize)]) -> Outcome {
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let leaders: Vec<&(String, usize)> = counts.iter().filter(|(_, c)| *c == max).collect();

    if leaders.len() == 1 {
        let (app, count) = leaders[0];
        let runner_up = counts
            .iter()
            .filter(|(a, _)| a != app)
            .fold(None::<&(String, usize)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        Outcome::Leader {
            app: app.clone(),
            count: *count,
            runner_up: runner_up.map(|(a, _)| a.clone()),
            runner_up_count: runner_up.map(|(_, c)| *c).unwrap_or(0),
        }
    } else {
        Outcome::Tie {
            apps: leaders.iter().map(|(a, _)| a.clone()).collect(),
            count: max,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThemeComparison {
    pub theme: Theme,
    pub sentiment: Sentiment,
    #[schema(value_type = Object)]
    pub counts: Vec<(String, usize)>,
    #[schema(value_type = Object)]
    pub outcome: Outcome,
    pub message: String,
}

impl fmt::Display for ThemeComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One comparison per (sentiment, theme), apps in `labels` order.
pub fn compare_themes(table: &[ThemeAssignment], labels: &[String]) -> Vec<ThemeComparison> {
    let mut out = Vec::new();
    for sentiment in Sentiment::ALL {
        for theme in Theme::ALL {
            let counts: Vec<(String, usize)> = labels
                .iter()
                .map(|l| (l.clone(), count_in(table, l, sentiment, theme)))
                .collect();
            let outcome = decide(&counts);
            out.push(ThemeComparison {
                theme,
                sentiment,
                message: format!("{}: {}", theme, outcome),
                counts,
                outcome,
            });
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BarSeries {
    pub app: String,
    pub values: Vec<usize>,
}

/// Grouped bars of theme keyword counts for one sentiment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ThemeBars {
    pub sentiment: Sentiment,
    pub themes: Vec<Theme>,
    pub series: Vec<BarSeries>,
}

pub fn theme_bars(table: &[ThemeAssignment], labels: &[String]) -> Vec<ThemeBars> {
    Sentiment::ALL
        .iter()
        .map(|&sentiment| ThemeBars {
            sentiment,
            themes: Theme::ALL.to_vec(),
            series: labels
                .iter()
                .map(|l| BarSeries {
                    app: l.clone(),
                    values: Theme::ALL
                        .iter()
                        .map(|&t| count_in(table, l, sentiment, t))
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Report {
    pub generated_at: String,
    pub dictionary_version: u32,
    pub distributions: Vec<SentimentDistribution>,
    pub themes: Vec<ThemeAssignment>,
    pub comparisons: Vec<ThemeComparison>,
    pub theme_bars: Vec<ThemeBars>,
}

impl Report {
    pub fn build(apps: &[AppReviews], top_n: usize) -> Self {
        let labels: Vec<String> = apps.iter().map(|a| a.label.clone()).collect();
        let table = theme_table(apps, top_n);

        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            dictionary_version: DICTIONARY_VERSION,
            distributions: apps
                .iter()
                .map(|a| SentimentDistribution::from_reviews(&a.label, &a.reviews))
                .collect(),
            comparisons: compare_themes(&table, &labels),
            theme_bars: theme_bars(&table, &labels),
            themes: table,
        }
    }

    /// Human-readable summary lines, as logged by the `report` stage.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec!["Sentiment Distribution Summary:".to_string()];
        for dist in &self.distributions {
            if dist.total == 0 {
                lines.push(format!("No sentiment data for {}", dist.app));
                continue;
            }
            lines.push(format!("{}:", dist.app));
            for slice in dist.slices.iter().filter(|s| s.count > 0) {
                lines.push(format!("  {}: {:.2}%", slice.sentiment, slice.percentage));
            }
        }

        lines.push("Thematic Comparison: Where Each App Outperforms".to_string());
        for sentiment in Sentiment::ALL {
            lines.push(format!("{} sentiment:", sentiment));
            for cmp in self.comparisons.iter().filter(|c| c.sentiment == sentiment) {
                lines.push(format!("  {}", cmp));
            }
        }
        lines
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

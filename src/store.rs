//! On-disk stores: raw reviews as pretty JSON, processed reviews as CSV.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{CleanedReview, LabeledReview, RawReview, ReviewText, Sentiment};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

pub fn write_raw(path: &Path, reviews: &[RawReview]) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(reviews).context("Failed to serialize reviews")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_raw(path: &Path) -> Result<Vec<RawReview>> {
    let data = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Failed to parse {}", path.display()))
}

/// One row of the processed CSV. `sentiment` is empty until the
/// classification stage has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRow {
    pub review_id: String,
    pub user_name: Option<String>,
    pub content: String,
    pub score: Option<u8>,
    pub thumbs_up_count: Option<u32>,
    pub at: Option<String>,
    pub reply_content: Option<String>,
    pub replied_at: Option<String>,
    pub app_version: Option<String>,
    pub lang: Option<String>,
    pub country: Option<String>,
    pub app_id: Option<String>,
    #[serde(rename = "cleaned_content")]
    pub cleaned_content: String,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
}

impl ProcessedRow {
    fn from_cleaned(review: &CleanedReview, sentiment: Option<Sentiment>) -> Self {
        let raw = &review.raw;
        Self {
            review_id: raw.review_id.clone(),
            user_name: raw.user_name.clone(),
            content: raw.content.as_ref().map(ReviewText::to_cell).unwrap_or_default(),
            score: raw.score,
            thumbs_up_count: raw.thumbs_up_count,
            at: raw.at.clone(),
            reply_content: raw.reply_content.clone(),
            replied_at: raw.replied_at.clone(),
            app_version: raw.app_version.clone(),
            lang: raw.lang.clone(),
            country: raw.country.clone(),
            app_id: raw.app_id.clone(),
            cleaned_content: review.cleaned_content.clone(),
            sentiment,
        }
    }

    fn into_cleaned(self) -> CleanedReview {
        CleanedReview {
            raw: RawReview {
                review_id: self.review_id,
                user_name: self.user_name,
                content: Some(ReviewText::Text(self.content)),
                score: self.score,
                thumbs_up_count: self.thumbs_up_count,
                at: self.at,
                reply_content: self.reply_content,
                replied_at: self.replied_at,
                app_version: self.app_version,
                lang: self.lang,
                country: self.country,
                app_id: self.app_id,
            },
            cleaned_content: self.cleaned_content,
        }
    }
}

fn write_rows(path: &Path, rows: impl IntoIterator<Item = ProcessedRow>) -> Result<()> {
    ensure_parent(path)?;
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_rows(path: &Path) -> Result<Vec<ProcessedRow>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("Failed to open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<ProcessedRow>, _>>()
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Processed store before classification (empty `sentiment` column).
pub fn write_cleaned(path: &Path, reviews: &[CleanedReview]) -> Result<()> {
    write_rows(path, reviews.iter().map(|r| ProcessedRow::from_cleaned(r, None)))
}

pub fn read_cleaned(path: &Path) -> Result<Vec<CleanedReview>> {
    Ok(read_rows(path)?.into_iter().map(ProcessedRow::into_cleaned).collect())
}

pub fn write_labeled(path: &Path, reviews: &[LabeledReview]) -> Result<()> {
    write_rows(
        path,
        reviews
            .iter()
            .map(|r| ProcessedRow::from_cleaned(&r.cleaned, Some(r.sentiment))),
    )
}

/// Rows that carry a sentiment; unlabelled rows are skipped.
pub fn read_labeled(path: &Path) -> Result<Vec<LabeledReview>> {
    Ok(read_rows(path)?
        .into_iter()
        .filter_map(|row| {
            let sentiment = row.sentiment?;
            Some(LabeledReview {
                cleaned: row.into_cleaned(),
                sentiment,
            })
        })
        .collect())
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    app: &'a str,
    content: &'a str,
    sentiment: Sentiment,
}

/// `app,content,sentiment` CSV of a filtered selection.
pub fn export_csv<'a>(rows: impl IntoIterator<Item = (&'a str, &'a LabeledReview)>) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for (app, review) in rows {
        let content = review.content();
        writer.serialize(ExportRow {
            app,
            content: &content,
            sentiment: review.sentiment,
        })?;
    }
    let bytes = writer.into_inner().context("Failed to finish CSV export")?;
    String::from_utf8(bytes).context("CSV export is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess;

    fn labeled(text: &str, sentiment: Sentiment) -> LabeledReview {
        let mut raw = RawReview::with_text(text);
        raw.score = Some(4);
        raw.at = Some("2024-05-01T10:00:00".to_string());
        LabeledReview {
            cleaned: CleanedReview {
                cleaned_content: preprocess::normalize_text(text),
                raw,
            },
            sentiment,
        }
    }

    #[test]
    fn test_labeled_round_trip_keeps_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("ride_cleaned.csv");

        let reviews = vec![
            labeled("ዋጋ ውድ ነው, driver late", Sentiment::Negative),
            labeled("Great app, \"quoted\" and, commas", Sentiment::Positive),
            labeled("ok\nmultiline", Sentiment::Neutral),
        ];
        write_labeled(&path, &reviews).unwrap();
        let back = read_labeled(&path).unwrap();

        assert_eq!(back.len(), reviews.len());
        for (a, b) in reviews.iter().zip(&back) {
            assert_eq!(a.sentiment, b.sentiment);
            assert_eq!(a.cleaned_content(), b.cleaned_content());
            assert_eq!(a.content(), b.content());
            assert_eq!(a.cleaned.raw.review_id, b.cleaned.raw.review_id);
        }
    }

    #[test]
    fn test_unlabeled_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feres_cleaned.csv");
        let cleaned = vec![labeled("cheap fare", Sentiment::Positive).cleaned];

        write_cleaned(&path, &cleaned).unwrap();
        assert_eq!(read_cleaned(&path).unwrap().len(), 1);
        assert!(read_labeled(&path).unwrap().is_empty());

        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("reviewId,userName,content,score,thumbsUpCount,at,"));
        assert!(header.lines().next().unwrap().ends_with("cleaned_content,sentiment"));
    }

    #[test]
    fn test_raw_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw").join("ride_reviews.json");
        let mut odd = RawReview::with_text("x");
        odd.content = Some(ReviewText::Other(serde_json::json!(42)));
        let reviews = vec![RawReview::with_text("ጥሩ አገልግሎት"), odd];

        write_raw(&path, &reviews).unwrap();
        assert_eq!(read_raw(&path).unwrap(), reviews);
        assert!(read_raw(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_export_csv() {
        let a = labeled("cheap fare", Sentiment::Positive);
        let b = labeled("late, again", Sentiment::Negative);
        let out = export_csv(vec![("RIDE", &a), ("Feres", &b)]).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "app,content,sentiment");
        assert_eq!(lines[1], "RIDE,cheap fare,positive");
        assert_eq!(lines[2], "Feres,\"late, again\",negative");
    }
}

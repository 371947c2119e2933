//! Interactive surface: JSON API over the labelled stores plus the static
//! dashboard page. Every request re-reads the processed CSVs and
//! recomputes its aggregates.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Settings;
use crate::models::{LabeledReview, Sentiment};
use crate::pipeline;
use crate::report::{AppReviews, Report, SentimentDistribution, SentimentSlice};
use crate::sentiment::{Assessment, SentimentClassifier};
use crate::store;
use crate::tfidf;
use crate::themes::{self, Theme};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

pub struct AppState {
    pub settings: Settings,
    pub classifier: Arc<SentimentClassifier>,
}

#[derive(OpenApi)]
#[openapi(
    paths(summary, list_reviews, export_reviews, sentiment_chart, theme_chart, analyze),
    components(schemas(
        Summary,
        ReviewItem,
        ReviewListing,
        AnalyzeRequest,
        AnalyzeResponse,
        ErrorBody,
        Report,
        SentimentDistribution,
        SentimentSlice,
        crate::report::ThemeAssignment,
        crate::report::ThemeComparison,
        crate::report::ThemeBars,
        crate::report::BarSeries,
        Sentiment,
        Theme
    )),
    tags(
        (name = "reviews", description = "Filtered review listing and export"),
        (name = "charts", description = "Chart-ready aggregates"),
        (name = "analysis", description = "Ad-hoc single review analysis")
    )
)]
struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/summary", get(summary))
        .route("/api/reviews", get(list_reviews))
        .route("/api/reviews/export", get(export_reviews))
        .route("/api/charts/sentiment", get(sentiment_chart))
        .route("/api/charts/themes", get(theme_chart))
        .route("/api/analyze", post(analyze))
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.settings.dashboard_addr.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🌐 Dashboard listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Dashboard request failed: {:#}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{:#}", e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

// ============================================================================
// Filtering
// ============================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReviewQuery {
    /// `Both` or an app label
    pub app: Option<String>,
    /// `All`, `positive`, `negative` or `neutral`
    pub sentiment: Option<String>,
    /// `All` or a theme name
    pub theme: Option<String>,
    /// Rows to list, 1..=50
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub app: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub theme: Option<Theme>,
    pub limit: usize,
}

fn is_wildcard(value: &Option<String>) -> bool {
    match value {
        None => true,
        Some(v) => {
            let v = v.trim();
            v.is_empty() || v.eq_ignore_ascii_case("all") || v.eq_ignore_ascii_case("both")
        }
    }
}

impl ReviewQuery {
    pub fn selection(&self, labels: &[String]) -> Result<Selection, ApiError> {
        let app = if is_wildcard(&self.app) {
            None
        } else {
            let wanted = self.app.as_deref().unwrap_or_default().trim();
            let label = labels
                .iter()
                .find(|l| l.eq_ignore_ascii_case(wanted))
                .ok_or_else(|| ApiError::bad_request(format!("Unknown app: {}", wanted)))?;
            Some(label.clone())
        };

        let sentiment = match &self.sentiment {
            s if is_wildcard(s) => None,
            Some(s) => Some(s.parse::<Sentiment>().map_err(ApiError::bad_request)?),
            None => None,
        };

        let theme = match &self.theme {
            t if is_wildcard(t) => None,
            Some(t) => Some(t.parse::<Theme>().map_err(ApiError::bad_request)?),
            None => None,
        };

        Ok(Selection {
            app,
            sentiment,
            theme,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }
}

/// Reviews passing every filter, app order then store order.
pub fn select<'a>(apps: &'a [AppReviews], sel: &Selection) -> Vec<(&'a str, &'a LabeledReview)> {
    apps.iter()
        .filter(|a| sel.app.as_deref().map_or(true, |wanted| a.label == wanted))
        .flat_map(|a| a.reviews.iter().map(move |r| (a.label.as_str(), r)))
        .filter(|(_, r)| sel.sentiment.map_or(true, |s| r.sentiment == s))
        .filter(|(_, r)| sel.theme.map_or(true, |t| t.matches(r.cleaned_content())))
        .collect()
}

static HIGHLIGHTERS: Lazy<HashMap<Theme, Regex>> = Lazy::new(|| {
    Theme::ALL
        .iter()
        .map(|&theme| {
            let mut triggers: Vec<&str> = theme.triggers().to_vec();
            triggers.sort_by_key(|t| std::cmp::Reverse(t.len()));
            let alternation = triggers
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            (theme, Regex::new(&alternation).expect("escaped trigger regex"))
        })
        .collect()
});

/// Wrap every trigger of `theme` in `**..**`. Case-sensitive; the longest
/// trigger wins where several overlap.
pub fn highlight(content: &str, theme: Theme) -> String {
    match HIGHLIGHTERS.get(&theme) {
        Some(re) => re.replace_all(content, "**$0**").into_owned(),
        None => content.to_string(),
    }
}

/// Read the labelled stores off the async workers.
async fn load(state: &AppState) -> Result<(Vec<AppReviews>, Vec<String>), ApiError> {
    let settings = state.settings.clone();
    let apps = tokio::task::spawn_blocking(move || pipeline::load_labeled(&settings))
        .await
        .map_err(anyhow::Error::from)??;
    let labels = apps.iter().map(|a| a.label.clone()).collect();
    Ok((apps, labels))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct Summary {
    pub total: usize,
    pub sentiments: Vec<SentimentSlice>,
    pub per_app: Vec<SentimentDistribution>,
}

#[utoipa::path(
    get,
    path = "/api/summary",
    responses((status = 200, description = "Review totals", body = Summary)),
    tag = "charts"
)]
pub async fn summary(State(state): State<Arc<AppState>>) -> Result<Json<Summary>, ApiError> {
    let (apps, _) = load(&state).await?;
    let all = SentimentDistribution::from_reviews("Both", apps.iter().flat_map(|a| a.reviews.iter()));

    Ok(Json(Summary {
        total: all.total,
        sentiments: all.slices,
        per_app: apps
            .iter()
            .map(|a| SentimentDistribution::from_reviews(&a.label, &a.reviews))
            .collect(),
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewItem {
    pub app: String,
    pub content: String,
    /// Content with theme triggers wrapped in `**`
    pub highlighted: String,
    pub sentiment: Sentiment,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewListing {
    pub matching: usize,
    pub reviews: Vec<ReviewItem>,
    pub message: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/reviews",
    params(ReviewQuery),
    responses(
        (status = 200, description = "Filtered reviews", body = ReviewListing),
        (status = 400, description = "Invalid filter", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ReviewListing>, ApiError> {
    let (apps, labels) = load(&state).await?;
    let sel = query.selection(&labels)?;
    let matching = select(&apps, &sel);

    let reviews = matching
        .iter()
        .take(sel.limit)
        .map(|(app, r)| {
            let content = r.content();
            let highlighted = match sel.theme {
                Some(theme) => highlight(&content, theme),
                None => content.clone(),
            };
            ReviewItem {
                app: app.to_string(),
                content,
                highlighted,
                sentiment: r.sentiment,
            }
        })
        .collect();

    Ok(Json(ReviewListing {
        matching: matching.len(),
        reviews,
        message: matching
            .is_empty()
            .then(|| "No reviews match the selected filters".to_string()),
    }))
}

#[utoipa::path(
    get,
    path = "/api/reviews/export",
    params(ReviewQuery),
    responses(
        (status = 200, description = "CSV of the filtered reviews (app, content, sentiment)", content_type = "text/csv", body = String),
        (status = 400, description = "Invalid filter", body = ErrorBody)
    ),
    tag = "reviews"
)]
pub async fn export_reviews(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReviewQuery>,
) -> Result<Response, ApiError> {
    let (apps, labels) = load(&state).await?;
    let sel = query.selection(&labels)?;
    let csv = store::export_csv(select(&apps, &sel))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"filtered_reviews.csv\""),
        ],
        csv,
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/api/charts/sentiment",
    params(ReviewQuery),
    responses(
        (status = 200, description = "One pie per app with data", body = [SentimentDistribution]),
        (status = 400, description = "Invalid filter", body = ErrorBody)
    ),
    tag = "charts"
)]
pub async fn sentiment_chart(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<Vec<SentimentDistribution>>, ApiError> {
    let (apps, labels) = load(&state).await?;
    let sel = query.selection(&labels)?;
    let selected = select(&apps, &sel);

    let pies = labels
        .iter()
        .filter(|l| sel.app.as_ref().map_or(true, |a| a == *l))
        .map(|l| {
            SentimentDistribution::from_reviews(
                l,
                selected
                    .iter()
                    .filter(|(app, _)| *app == l.as_str())
                    .map(|(_, r)| *r),
            )
        })
        .filter(|d| d.total > 0)
        .collect();
    Ok(Json(pies))
}

#[utoipa::path(
    get,
    path = "/api/charts/themes",
    responses((status = 200, description = "Theme table, bars and per-theme winners", body = Report)),
    tag = "charts"
)]
pub async fn theme_chart(State(state): State<Arc<AppState>>) -> Result<Json<Report>, ApiError> {
    let (apps, _) = load(&state).await?;
    let top_n = state.settings.top_n;
    let report = tokio::task::spawn_blocking(move || Report::build(&apps, top_n))
        .await
        .map_err(anyhow::Error::from)?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyzeResponse {
    pub sentiment: Sentiment,
    /// Model star rating; absent when the model was not consulted or failed
    pub stars: Option<u8>,
    pub classifier_available: bool,
    /// Why the classifier could not be used, when it failed
    pub error: Option<String>,
    pub keywords: Vec<String>,
    #[schema(value_type = Object)]
    pub themes: BTreeMap<Theme, Vec<String>>,
}

#[utoipa::path(
    post,
    path = "/api/analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Sentiment and themes of the text", body = AnalyzeResponse),
        (status = 400, description = "Empty text", body = ErrorBody)
    ),
    tag = "analysis"
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(ApiError::bad_request("Enter a review to analyze"));
    }

    let assessment = state.classifier.assess(Some(&req.text)).await;
    let (stars, error) = match &assessment {
        Assessment::Rated { stars, .. } => (Some(*stars), None),
        Assessment::Blank => (None, None),
        Assessment::Unavailable(e) => (None, Some(e.to_string())),
    };
    let keywords = tfidf::extract_keywords(&[req.text.as_str()], state.settings.top_n);
    let grouped = themes::non_empty(themes::group_themes(&keywords));

    Ok(Json(AnalyzeResponse {
        sentiment: assessment.sentiment(),
        stars,
        classifier_available: error.is_none(),
        error,
        keywords,
        themes: grouped,
    }))
}

//! HTTP handlers for the dashboard

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, warn};

use super::state::AppState;
use crate::analytics::{analyze_runs, load_run_ratings, tracked_red_flags, RunsAnalysis};
use crate::ratings::{CandidateId, Criteria, Evaluation, RatingSet, RubricDefinition, RunSummary};
use crate::scoring::{navigation_order, round2, GapReport, SortMode, WeightedScore};
use crate::store::{RatingStore, StoreError};

/// Error returned by the JSON API as `{"error": "..."}`
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

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::MalformedData { .. } | StoreError::Io { .. } => {
                error!("Store failure: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(e: askama::Error) -> Self {
        error!("Failed to render template: {}", e);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Failed to render page".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Which side of the comparison to read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingKind {
    Human,
    #[default]
    Ai,
}

#[derive(Debug, Deserialize)]
pub struct RatingsQuery {
    #[serde(default, rename = "type")]
    pub kind: RatingKind,
    /// Run file to read AI ratings from; the legacy file when absent
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRatingRequest {
    pub candidate_id: CandidateId,
    pub evaluation: Evaluation,
}

#[derive(Debug, Serialize)]
pub struct SaveRatingResponse {
    pub success: bool,
    pub evaluation: Evaluation,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub criteria: Criteria,
    #[serde(default)]
    pub red_flags: BTreeSet<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HideResponse {
    pub success: bool,
    pub hide_from_dashboard: bool,
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub sort_by_gap: bool,
}

#[derive(Debug, Deserialize)]
pub struct CandidatesQuery {
    #[serde(default)]
    pub sort: SortMode,
    pub filename: Option<String>,
}

/// AI ratings for a run, or the legacy file; empty on any read failure
async fn ai_ratings(state: &AppState, filename: Option<&str>) -> RatingSet {
    match filename {
        Some(run) => load_run_ratings(&state.store, run).await,
        None => state.store.legacy_ai_ratings().await.unwrap_or_else(|e| {
            warn!("Using empty legacy AI ratings: {}", e);
            RatingSet::new()
        }),
    }
}

// ============================================================================
// Page Handlers (HTML)
// ============================================================================

/// Dashboard with the evaluate and analytics tabs
pub async fn index() -> Response {
    Html(include_str!("../../templates/index.html")).into_response()
}

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    source: String,
    generated_at: String,
    analyzed: usize,
    paired: usize,
    metrics: Vec<(String, String)>,
    distribution: Vec<(String, usize)>,
    categories: Vec<CategoryRow>,
    flags: Vec<FlagRow>,
    top_gaps: Vec<GapRow>,
    overrating: String,
    blindspots: Vec<String>,
}

struct CategoryRow {
    name: String,
    avg_gap: String,
    ai_avg: String,
    human_avg: String,
    bias: String,
    worst: String,
}

struct FlagRow {
    id: String,
    description: String,
    human: usize,
    ai: usize,
    missed: String,
}

struct GapRow {
    candidate: String,
    image: String,
    gap: String,
    human: String,
    ai: String,
    human_flags: String,
    ai_flags: String,
}

fn join_display<T: ToString>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ReportTemplate {
    fn new(report: &GapReport, rubric: Option<&RubricDefinition>) -> Self {
        let m = &report.overall;
        let d = &report.gap_distribution;
        ReportTemplate {
            source: report.source.clone(),
            generated_at: report.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            analyzed: report.total_candidates_analyzed,
            paired: report.candidates_with_both_ratings,
            metrics: vec![
                ("Average gap".to_string(), format!("{:.3}", m.average_gap)),
                ("Median gap".to_string(), format!("{:.3}", m.median_gap)),
                ("Correlation".to_string(), format!("{:.3}", m.correlation)),
                ("Accuracy".to_string(), format!("{:.1}%", m.accuracy_rate)),
                ("AI average".to_string(), format!("{:.2}", m.ai_average_score)),
                ("Human average".to_string(), format!("{:.2}", m.human_average_score)),
                (
                    "AI bias".to_string(),
                    format!("{} ({:.3})", m.ai_bias, m.bias_magnitude),
                ),
            ],
            distribution: vec![
                ("Large (>= 1.5)".to_string(), d.large),
                ("Medium (0.5 - 1.5)".to_string(), d.medium),
                ("Small (< 0.5)".to_string(), d.small),
            ],
            categories: report
                .category_analysis
                .iter()
                .map(|(criterion, a)| CategoryRow {
                    name: criterion.to_string(),
                    avg_gap: format!("{:.2}", a.avg_gap),
                    ai_avg: format!("{:.2}", a.ai_avg),
                    human_avg: format!("{:.2}", a.human_avg),
                    bias: a.ai_bias.to_string(),
                    worst: join_display(&a.worst_gaps),
                })
                .collect(),
            flags: report
                .red_flag_analysis
                .iter()
                .map(|(id, a)| FlagRow {
                    id: id.clone(),
                    description: rubric
                        .and_then(|r| r.red_flag(id))
                        .map(|f| f.description.clone())
                        .unwrap_or_default(),
                    human: a.human_flagged,
                    ai: a.ai_flagged,
                    missed: join_display(&a.missed_by_ai),
                })
                .collect(),
            top_gaps: report
                .top_gap_candidates
                .iter()
                .map(|c| GapRow {
                    candidate: c.candidate_id.to_string(),
                    image: c.image_file.clone(),
                    gap: format!("{:.2}", c.overall_gap),
                    human: format!("{:.2}", c.human_score),
                    ai: format!("{:.2}", c.ai_score),
                    human_flags: join_display(&c.human_flags),
                    ai_flags: join_display(&c.ai_flags),
                })
                .collect(),
            overrating: format!("{:.0}%", report.key_patterns.ai_overrating_frequency * 100.0),
            blindspots: report.key_patterns.common_ai_blindspots.clone(),
        }
    }
}

/// Gap report of one run against the human ratings
pub async fn report_page(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Html<String>> {
    let human = state.store.human_ratings().await?;
    let ai = state.store.run_evaluations(&filename).await?;
    let rubric = state.store.rubric().await.ok();
    let flags = tracked_red_flags(rubric.as_ref());

    let report = GapReport::build(&filename, &human, &ai, &flags, &state.comparison_settings());
    let page = ReportTemplate::new(&report, rubric.as_ref()).render()?;
    Ok(Html(page))
}

// ============================================================================
// API Handlers (JSON)
// ============================================================================

/// Human ratings, or AI ratings from a run or the legacy file
pub async fn api_get_ratings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RatingsQuery>,
) -> ApiResult<Json<RatingSet>> {
    let ratings = match query.kind {
        RatingKind::Human => state.store.human_ratings().await?,
        RatingKind::Ai => ai_ratings(&state, query.filename.as_deref()).await,
    };
    Ok(Json(ratings))
}

/// One candidate's human evaluation, or a blank one at the scale midpoint
pub async fn api_get_human_rating(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<CandidateId>,
) -> ApiResult<Json<Evaluation>> {
    let neutral = state.config.scoring.scale.neutral();
    let evaluation = state
        .store
        .get_human_evaluation(&candidate_id)
        .await?
        .unwrap_or_else(|| Evaluation::new(candidate_id, neutral));
    Ok(Json(evaluation))
}

/// Save a human evaluation after recomputing its derived fields
pub async fn api_save_rating(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveRatingRequest>,
) -> ApiResult<Json<SaveRatingResponse>> {
    let mut evaluation = request.evaluation;
    evaluation.candidate_id = request.candidate_id.clone();
    if evaluation.image_filename.is_none() {
        evaluation.image_filename = Some(request.candidate_id.image_filename());
    }

    let engine = state.engine().await;
    engine.recompute(&mut evaluation);
    evaluation.touch();

    state
        .store
        .put_human_evaluation(&request.candidate_id, evaluation.clone())
        .await?;

    Ok(Json(SaveRatingResponse {
        success: true,
        evaluation,
    }))
}

/// Preview of the derived scores for unsaved edits
pub async fn api_score(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoreRequest>,
) -> Json<WeightedScore> {
    let engine = state.engine().await;
    Json(
        engine
            .compute_weighted_score(&request.criteria, &request.red_flags)
            .rounded(),
    )
}

/// Rubric exactly as stored
pub async fn api_rubric(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let rubric = state.store.rubric().await?;
    Ok(Json(rubric.raw().clone()))
}

pub async fn api_list_runs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<RunSummary>>> {
    Ok(Json(state.store.list_runs().await?))
}

pub async fn api_evaluation_data(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Json<RatingSet>> {
    Ok(Json(state.store.run_evaluations(&filename).await?))
}

/// Set or clear a run's `hideFromDashboard` flag
pub async fn api_hide_run(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<HideResponse>> {
    let hidden = body
        .get("hideFromDashboard")
        .and_then(Value::as_bool)
        .ok_or_else(|| ApiError::bad_request("hideFromDashboard must be a boolean"))?;

    let run = state.store.set_run_visibility(&filename, hidden).await?;

    Ok(Json(HideResponse {
        success: true,
        hide_from_dashboard: run.hide_from_dashboard,
        filename: run.filename,
    }))
}

/// Comparison of every visible run against the human ratings
pub async fn api_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<RunsAnalysis>> {
    let mut analysis =
        analyze_runs(&state.store, query.show_hidden, &state.comparison_settings()).await?;

    if query.sort_by_gap {
        for run in &mut analysis.runs {
            run.report.candidates = run.report.sorted_by_gap().into_iter().cloned().collect();
        }
    }

    Ok(Json(analysis))
}

/// Order in which the evaluate tab steps through candidates
pub async fn api_candidates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidatesQuery>,
) -> ApiResult<Json<Vec<CandidateId>>> {
    let human = state.store.human_ratings().await?;
    let ai = ai_ratings(&state, query.filename.as_deref()).await;
    Ok(Json(navigation_order(
        &human,
        &ai,
        query.sort,
        state.config.scoring.candidate_count,
    )))
}

/// Candidate screenshot
pub async fn api_image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let bytes = state.store.candidate_image(&filename).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response())
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let runs = state.store.list_runs().await.map(|r| r.len()).ok();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "portfolio-eval",
        "scale": state.config.scoring.scale.to_string(),
        "neutral_score": round2(state.config.scoring.scale.neutral()),
        "runs": runs,
    }))
}

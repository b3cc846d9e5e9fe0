use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a portfolio candidate.
///
/// Stored as the raw string key used in the rating files, but ordered
/// numerically so that `"2"` sorts before `"10"`. Ids that are not numbers
/// sort after every numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn number(&self) -> Option<u64> {
        self.0.trim().parse().ok()
    }

    /// Filename of the screenshot served for this candidate
    pub fn image_filename(&self) -> String {
        format!("candidate_{}.jpg", self.0)
    }
}

impl Ord for CandidateId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CandidateId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for CandidateId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

/// The three scored design dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Typography,
    LayoutComposition,
    Color,
}

impl Criterion {
    pub const ALL: [Criterion; 3] = [
        Criterion::Typography,
        Criterion::LayoutComposition,
        Criterion::Color,
    ];

    /// Fixed contribution of this dimension to the weighted score
    pub fn weight(&self) -> f64 {
        match self {
            Criterion::Typography => 0.35,
            Criterion::LayoutComposition => 0.35,
            Criterion::Color => 0.30,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Criterion::Typography => "typography",
            Criterion::LayoutComposition => "layout_composition",
            Criterion::Color => "color",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Typography => write!(f, "typography"),
            Criterion::LayoutComposition => write!(f, "layout"),
            Criterion::Color => write!(f, "color"),
        }
    }
}

/// Kind of portfolio the candidate submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortfolioCategory {
    #[default]
    Unknown,
    Minimal,
    Standard,
    Elaborate,
}

impl From<String> for PortfolioCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Minimal" => PortfolioCategory::Minimal,
            "Standard" => PortfolioCategory::Standard,
            "Elaborate" => PortfolioCategory::Elaborate,
            _ => PortfolioCategory::Unknown,
        }
    }
}

impl From<PortfolioCategory> for String {
    fn from(value: PortfolioCategory) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PortfolioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioCategory::Unknown => write!(f, "Unknown"),
            PortfolioCategory::Minimal => write!(f, "Minimal"),
            PortfolioCategory::Standard => write!(f, "Standard"),
            PortfolioCategory::Elaborate => write!(f, "Elaborate"),
        }
    }
}

/// One evaluated dimension of a portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub confidence: f64,
}

impl CriterionScore {
    pub fn new(score: f64, confidence: f64) -> Self {
        Self {
            score,
            explanation: String::new(),
            confidence,
        }
    }
}

/// Scores for all three dimensions.
///
/// Each slot is optional on disk because older AI runs omitted dimensions the
/// model did not answer; the scorer fills the gaps with neutral values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typography: Option<CriterionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_composition: Option<CriterionScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<CriterionScore>,
}

impl Criteria {
    /// All three dimensions at the same score and confidence
    pub fn uniform(score: f64, confidence: f64) -> Self {
        Self {
            typography: Some(CriterionScore::new(score, confidence)),
            layout_composition: Some(CriterionScore::new(score, confidence)),
            color: Some(CriterionScore::new(score, confidence)),
        }
    }

    /// No dimension has been scored
    pub fn is_empty(&self) -> bool {
        self.typography.is_none() && self.layout_composition.is_none() && self.color.is_none()
    }

    pub fn get(&self, criterion: Criterion) -> Option<&CriterionScore> {
        match criterion {
            Criterion::Typography => self.typography.as_ref(),
            Criterion::LayoutComposition => self.layout_composition.as_ref(),
            Criterion::Color => self.color.as_ref(),
        }
    }

    pub fn get_mut(&mut self, criterion: Criterion) -> Option<&mut CriterionScore> {
        match criterion {
            Criterion::Typography => self.typography.as_mut(),
            Criterion::LayoutComposition => self.layout_composition.as_mut(),
            Criterion::Color => self.color.as_mut(),
        }
    }
}

/// A human or AI assessment of a single candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default = "unknown_candidate")]
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub portfolio_category: PortfolioCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_filename: Option<String>,
    #[serde(default)]
    pub criteria: Criteria,
    #[serde(default)]
    pub red_flags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_weighted_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_applied: Option<f64>,
    /// Weighted score after penalties; may be negative
    #[serde(default)]
    pub overall_weighted_score: f64,
    #[serde(default)]
    pub overall_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_at: Option<String>,
    /// Fields written by other tools that must survive a rewrite
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn unknown_candidate() -> CandidateId {
    CandidateId::new("")
}

impl Evaluation {
    /// Fresh record for a candidate that has not been rated yet
    pub fn new(candidate_id: CandidateId, neutral_score: f64) -> Self {
        let image_filename = Some(candidate_id.image_filename());
        Self {
            candidate_id,
            portfolio_category: PortfolioCategory::Minimal,
            image_filename,
            criteria: Criteria::uniform(neutral_score, neutral_score),
            red_flags: BTreeSet::new(),
            base_weighted_score: None,
            penalty_applied: None,
            overall_weighted_score: neutral_score,
            overall_confidence: neutral_score,
            evaluated_at: Some(Utc::now().to_rfc3339()),
            extra: Map::new(),
        }
    }

    pub fn score_for(&self, criterion: Criterion) -> Option<f64> {
        self.criteria.get(criterion).map(|c| c.score)
    }

    pub fn touch(&mut self) {
        self.evaluated_at = Some(Utc::now().to_rfc3339());
    }
}

/// Ratings keyed by candidate, ordered by numeric candidate id
pub type RatingSet = BTreeMap<CandidateId, Evaluation>;

/// Model that produced an AI run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Metadata block at the top of a run file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub model_used: Option<ModelInfo>,
    #[serde(default)]
    pub total_candidates_evaluated: u32,
    #[serde(default)]
    pub evaluation_complete: bool,
    #[serde(default, rename = "hideFromDashboard")]
    pub hide_from_dashboard: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One AI run as shown in the run listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub filename: String,
    pub timestamp: String,
    pub model: String,
    pub total_candidates: u32,
    pub complete: bool,
    #[serde(rename = "hideFromDashboard")]
    pub hide_from_dashboard: bool,
}

impl RunSummary {
    pub fn from_metadata(filename: &str, metadata: Option<&RunMetadata>) -> Self {
        let unknown = || "unknown".to_string();
        match metadata {
            Some(meta) => Self {
                filename: filename.to_string(),
                timestamp: meta.timestamp.clone().unwrap_or_else(unknown),
                model: meta
                    .model_used
                    .as_ref()
                    .and_then(|m| m.model.clone())
                    .unwrap_or_else(unknown),
                total_candidates: meta.total_candidates_evaluated,
                complete: meta.evaluation_complete,
                hide_from_dashboard: meta.hide_from_dashboard,
            },
            None => Self {
                filename: filename.to_string(),
                timestamp: unknown(),
                model: unknown(),
                total_candidates: 0,
                complete: false,
                hide_from_dashboard: false,
            },
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Whether this run is a copy migrated to the 5-point scale
    pub fn is_five_scale(&self) -> bool {
        self.filename.contains("5scale")
    }
}

/// Newest first; on equal timestamps, original runs before their 5-scale
/// copies. Unparseable timestamps go last.
pub fn sort_runs(runs: &mut [RunSummary]) {
    runs.sort_by(|a, b| {
        let by_time = match (a.parsed_timestamp(), b.parsed_timestamp()) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_time.then_with(|| a.is_five_scale().cmp(&b.is_five_scale()))
    });
}

/// Parse RFC 3339 or a naive ISO-8601 timestamp (taken as UTC)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Inclusive bounds of the rating scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreScale {
    pub min: f64,
    pub max: f64,
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self::FIVE_POINT
    }
}

impl ScoreScale {
    pub const FOUR_POINT: ScoreScale = ScoreScale { min: 1.0, max: 4.0 };
    pub const FIVE_POINT: ScoreScale = ScoreScale { min: 1.0, max: 5.0 };

    /// Midpoint used in place of a missing score or confidence
    pub fn neutral(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Map a value on this scale linearly onto `target`
    pub fn convert(&self, value: f64, target: &ScoreScale) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 {
            return target.min;
        }
        (value - self.min) / span * (target.max - target.min) + target.min
    }
}

impl fmt::Display for ScoreScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filename: &str, timestamp: &str) -> RunSummary {
        RunSummary {
            filename: filename.to_string(),
            timestamp: timestamp.to_string(),
            model: "gpt-5".to_string(),
            total_candidates: 54,
            complete: true,
            hide_from_dashboard: false,
        }
    }

    #[test]
    fn test_candidate_ids_sort_numerically() {
        let mut ids: Vec<CandidateId> = ["10", "2", "abc", "1"].into_iter().map(CandidateId::new).collect();
        ids.sort();
        let ordered: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ordered, vec!["1", "2", "10", "abc"]);
    }

    #[test]
    fn test_image_filename() {
        assert_eq!(CandidateId::from(7).image_filename(), "candidate_7.jpg");
    }

    #[test]
    fn test_runs_sort_newest_first() {
        let mut runs = vec![
            run("evaluation_a.json", "2025-01-01T10:00:00"),
            run("evaluation_b.json", "2025-02-01T10:00:00"),
            run("evaluation_c.json", "unknown"),
        ];
        sort_runs(&mut runs);
        let names: Vec<&str> = runs.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["evaluation_b.json", "evaluation_a.json", "evaluation_c.json"]);
    }

    #[test]
    fn test_equal_timestamps_prefer_original_scale() {
        let mut runs = vec![
            run("evaluation_x_5scale.json", "2025-03-01T09:30:00.123456"),
            run("evaluation_x.json", "2025-03-01T09:30:00.123456"),
        ];
        sort_runs(&mut runs);
        assert_eq!(runs[0].filename, "evaluation_x.json");
        assert_eq!(runs[1].filename, "evaluation_x_5scale.json");
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-03-01T09:30:00Z").is_some());
        assert!(parse_timestamp("2025-03-01T09:30:00+02:00").is_some());
        assert!(parse_timestamp("2025-03-01T09:30:00.5").is_some());
        assert!(parse_timestamp("unknown").is_none());
    }

    #[test]
    fn test_scale_conversion() {
        let four = ScoreScale::FOUR_POINT;
        let five = ScoreScale::FIVE_POINT;
        assert_eq!(four.convert(1.0, &five), 1.0);
        assert_eq!(four.convert(4.0, &five), 5.0);
        assert!((four.convert(2.0, &five) - 2.3333).abs() < 0.001);
        assert_eq!(five.neutral(), 3.0);
        assert_eq!(four.neutral(), 2.5);
    }

    #[test]
    fn test_evaluation_keeps_unknown_fields() {
        let json = r#"{
            "candidate_id": "3",
            "portfolio_category": "Elaborate",
            "criteria": {"typography": {"score": 4, "explanation": "tidy", "confidence": 3}},
            "red_flags": ["sloppy_images"],
            "overall_weighted_score": 3.2,
            "reviewer_note": "second pass"
        }"#;
        let evaluation: Evaluation = serde_json::from_str(json).unwrap();
        assert_eq!(evaluation.portfolio_category, PortfolioCategory::Elaborate);
        assert_eq!(evaluation.score_for(Criterion::Typography), Some(4.0));
        assert_eq!(evaluation.score_for(Criterion::Color), None);

        let back = serde_json::to_value(&evaluation).unwrap();
        assert_eq!(back["reviewer_note"], "second pass");
        assert_eq!(back["portfolio_category"], "Elaborate");
    }

    #[test]
    fn test_unrecognized_category_is_unknown() {
        let category: PortfolioCategory = serde_json::from_str("\"Baroque\"").unwrap();
        assert_eq!(category, PortfolioCategory::Unknown);
    }
}

//! Weighted scoring of evaluations and human/AI comparison statistics.
//!
//! Everything here is a pure function of its inputs; callers recompute after
//! every edit instead of relying on cached derived fields.

mod compare;
mod report;

pub use compare::{
    compare_rating_sets, navigation_order, ComparisonReport, ComparisonSettings, SortMode,
};
pub use report::GapReport;

use crate::ratings::{Criteria, Criterion, Evaluation, RubricDefinition, ScoreScale};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Penalty applied per red flag when the rubric gives none
const DEFAULT_PENALTIES: [(&str, f64); 3] = [
    ("template_scent_high", 0.5),
    ("sloppy_images", 0.3),
    ("process_soup", 0.2),
];

/// Round to two decimals for display and storage
pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // avoid serializing -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Red flag id -> score penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyTable(BTreeMap<String, f64>);

impl Default for PenaltyTable {
    fn default() -> Self {
        Self(
            DEFAULT_PENALTIES
                .iter()
                .map(|(flag, penalty)| (flag.to_string(), *penalty))
                .collect(),
        )
    }
}

impl PenaltyTable {
    /// Built-in penalties, overridden or extended by explicit rubric values
    pub fn from_rubric(rubric: &RubricDefinition) -> Self {
        let mut table = Self::default();
        for flag in &rubric.red_flags {
            if let Some(penalty) = flag.penalty {
                table.0.insert(flag.id.clone(), penalty);
            }
        }
        table
    }

    /// Unknown flags cost nothing
    pub fn penalty(&self, flag: &str) -> f64 {
        self.0.get(flag).copied().unwrap_or(0.0)
    }

    pub fn total(&self, flags: &BTreeSet<String>) -> f64 {
        flags.iter().map(|flag| self.penalty(flag)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(flag, penalty)| (flag.as_str(), *penalty))
    }

    pub fn flag_ids(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

/// Derived scores of one evaluation, at full precision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedScore {
    pub base: f64,
    pub penalty: f64,
    /// `base - penalty`, deliberately not clamped to the scale minimum
    pub overall: f64,
    pub confidence: f64,
}

impl WeightedScore {
    pub fn rounded(&self) -> Self {
        Self {
            base: round2(self.base),
            penalty: round2(self.penalty),
            overall: round2(self.overall),
            confidence: round2(self.confidence),
        }
    }
}

/// Computes weighted scores against a penalty table and rating scale
#[derive(Debug, Clone, Default)]
pub struct ScoreEngine {
    penalties: PenaltyTable,
    scale: ScoreScale,
}

impl ScoreEngine {
    pub fn new(penalties: PenaltyTable, scale: ScoreScale) -> Self {
        Self { penalties, scale }
    }

    pub fn penalties(&self) -> &PenaltyTable {
        &self.penalties
    }

    pub fn scale(&self) -> ScoreScale {
        self.scale
    }

    /// Weighted base score, red flag penalty and mean confidence.
    ///
    /// A missing dimension counts as the scale midpoint for both its score
    /// and its confidence.
    pub fn compute_weighted_score(
        &self,
        criteria: &Criteria,
        red_flags: &BTreeSet<String>,
    ) -> WeightedScore {
        let neutral = self.scale.neutral();

        let base: f64 = Criterion::ALL
            .iter()
            .map(|c| criteria.get(*c).map_or(neutral, |s| s.score) * c.weight())
            .sum();

        let confidence = Criterion::ALL
            .iter()
            .map(|c| criteria.get(*c).map_or(neutral, |s| s.confidence))
            .sum::<f64>()
            / Criterion::ALL.len() as f64;

        let penalty = self.penalties.total(red_flags);

        WeightedScore {
            base,
            penalty,
            overall: base - penalty,
            confidence,
        }
    }

    /// Rewrite every derived field of `evaluation` from its criteria and flags
    pub fn recompute(&self, evaluation: &mut Evaluation) -> WeightedScore {
        for criterion in Criterion::ALL {
            if let Some(score) = evaluation.criteria.get(criterion) {
                if !self.scale.contains(score.score) {
                    tracing::debug!(
                        "Candidate {} {} score {} outside scale {}",
                        evaluation.candidate_id,
                        criterion,
                        score.score,
                        self.scale
                    );
                }
            }
        }

        let score = self
            .compute_weighted_score(&evaluation.criteria, &evaluation.red_flags)
            .rounded();

        evaluation.base_weighted_score = Some(score.base);
        evaluation.penalty_applied = Some(score.penalty);
        evaluation.overall_weighted_score = score.overall;
        evaluation.overall_confidence = score.confidence;

        score
    }

    /// Add penalty fields to a record written before red flags were scored.
    ///
    /// The stored overall becomes the base; records that already carry a
    /// penalty are left alone. Returns whether the record changed.
    pub fn backfill_penalty(&self, evaluation: &mut Evaluation) -> bool {
        let mut changed = false;

        if evaluation.base_weighted_score.is_none() {
            evaluation.base_weighted_score = Some(evaluation.overall_weighted_score);
            changed = true;
        }

        if evaluation.penalty_applied.is_none() {
            let penalty = self.penalties.total(&evaluation.red_flags);
            let base = evaluation
                .base_weighted_score
                .unwrap_or(evaluation.overall_weighted_score);
            evaluation.penalty_applied = Some(round2(penalty));
            evaluation.overall_weighted_score = round2(base - penalty);
            changed = true;
        }

        changed
    }

    /// Convert every score and confidence from `from` onto this engine's
    /// scale, then recompute the derived fields. Records without criteria
    /// keep their stored scores.
    pub fn migrate_scale(&self, evaluation: &mut Evaluation, from: &ScoreScale) {
        if evaluation.criteria.is_empty() {
            return;
        }

        for criterion in Criterion::ALL {
            if let Some(score) = evaluation.criteria.get_mut(criterion) {
                score.score = round2(from.convert(score.score, &self.scale));
                score.confidence = round2(from.convert(score.confidence, &self.scale));
            }
        }
        self.recompute(evaluation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::{CandidateId, CriterionScore};

    fn criteria(typography: f64, layout: f64, color: f64) -> Criteria {
        Criteria {
            typography: Some(CriterionScore::new(typography, 4.0)),
            layout_composition: Some(CriterionScore::new(layout, 3.0)),
            color: Some(CriterionScore::new(color, 2.0)),
        }
    }

    fn flags(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_weighted_score_with_penalty() {
        let engine = ScoreEngine::default();
        let score = engine
            .compute_weighted_score(&criteria(4.0, 3.0, 5.0), &flags(&["sloppy_images"]))
            .rounded();
        // 4 * 0.35 + 3 * 0.35 + 5 * 0.30 = 1.4 + 1.05 + 1.5 = 3.95
        assert!((score.base - 3.95).abs() < 1e-9);
        assert!((score.penalty - 0.3).abs() < 1e-9);
        assert!((score.overall - 3.65).abs() < 1e-9);
        assert!((score.confidence - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_flags_not_clamped() {
        let engine = ScoreEngine::default();
        let all = flags(&["template_scent_high", "sloppy_images", "process_soup"]);

        let floor = engine.compute_weighted_score(&criteria(1.0, 1.0, 1.0), &all).rounded();
        assert!((floor.penalty - 1.0).abs() < 1e-9);
        assert_eq!(floor.overall, 0.0);

        let below = engine
            .compute_weighted_score(&Criteria::uniform(0.5, 1.0), &all)
            .rounded();
        assert!(below.overall < 0.0);
    }

    #[test]
    fn test_deterministic() {
        let engine = ScoreEngine::default();
        let c = criteria(2.0, 5.0, 3.0);
        let f = flags(&["process_soup"]);
        let first = engine.compute_weighted_score(&c, &f);
        for _ in 0..10 {
            assert_eq!(engine.compute_weighted_score(&c, &f), first);
        }
    }

    #[test]
    fn test_unknown_flag_is_free() {
        let engine = ScoreEngine::default();
        let score = engine.compute_weighted_score(&criteria(3.0, 3.0, 3.0), &flags(&["mystery"]));
        assert_eq!(score.penalty, 0.0);
    }

    #[test]
    fn test_missing_dimension_uses_neutral() {
        let engine = ScoreEngine::new(PenaltyTable::default(), ScoreScale::FOUR_POINT);
        let score = engine.compute_weighted_score(&Criteria::default(), &BTreeSet::new());
        assert!((score.base - 2.5).abs() < 1e-9);
        assert!((score.confidence - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_rubric_penalty_override() {
        let rubric = RubricDefinition::from_value(serde_json::json!({
            "red_flags": [
                {"id": "sloppy_images", "penalty": 0.6},
                {"id": "stock_photos", "penalty": 0.25},
                "process_soup: Wall of process text"
            ]
        }))
        .unwrap();
        let table = PenaltyTable::from_rubric(&rubric);
        assert_eq!(table.penalty("sloppy_images"), 0.6);
        assert_eq!(table.penalty("stock_photos"), 0.25);
        assert_eq!(table.penalty("process_soup"), 0.2);
        assert_eq!(table.penalty("template_scent_high"), 0.5);
    }

    #[test]
    fn test_recompute_updates_all_fields() {
        let engine = ScoreEngine::default();
        let mut evaluation = Evaluation::new(CandidateId::from(1), 3.0);
        evaluation.criteria = criteria(4.0, 3.0, 5.0);
        evaluation.red_flags = flags(&["template_scent_high"]);

        engine.recompute(&mut evaluation);

        assert_eq!(evaluation.base_weighted_score, Some(3.95));
        assert_eq!(evaluation.penalty_applied, Some(0.5));
        assert_eq!(evaluation.overall_weighted_score, 3.45);
        assert_eq!(evaluation.overall_confidence, 3.0);
    }

    #[test]
    fn test_backfill_penalty() {
        let engine = ScoreEngine::default();
        let mut evaluation = Evaluation::new(CandidateId::from(2), 3.0);
        evaluation.overall_weighted_score = 3.4;
        evaluation.red_flags = flags(&["process_soup"]);

        assert!(engine.backfill_penalty(&mut evaluation));
        assert_eq!(evaluation.base_weighted_score, Some(3.4));
        assert_eq!(evaluation.penalty_applied, Some(0.2));
        assert_eq!(evaluation.overall_weighted_score, 3.2);

        // second pass is a no-op
        assert!(!engine.backfill_penalty(&mut evaluation));
        assert_eq!(evaluation.overall_weighted_score, 3.2);
    }

    #[test]
    fn test_migrate_scale() {
        let engine = ScoreEngine::default();
        let mut evaluation = Evaluation::new(CandidateId::from(3), 2.5);
        evaluation.criteria = Criteria::uniform(4.0, 4.0);

        engine.migrate_scale(&mut evaluation, &ScoreScale::FOUR_POINT);

        assert_eq!(evaluation.score_for(Criterion::Typography), Some(5.0));
        assert_eq!(evaluation.overall_weighted_score, 5.0);
        assert_eq!(evaluation.overall_confidence, 5.0);
    }

    #[test]
    fn test_migrate_scale_without_criteria_keeps_scores() {
        let engine = ScoreEngine::default();
        let mut evaluation: Evaluation = serde_json::from_value(serde_json::json!({
            "candidate_id": "5",
            "overall_weighted_score": 1.4,
            "overall_confidence": 2.0
        }))
        .unwrap();
        let before = evaluation.clone();

        engine.migrate_scale(&mut evaluation, &ScoreScale::FOUR_POINT);

        assert_eq!(evaluation, before);
        assert_eq!(evaluation.overall_weighted_score, 1.4);
        assert_eq!(evaluation.base_weighted_score, None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.14159), 3.14);
        assert_eq!(round2(-0.0001), 0.0);
        assert!(round2(-0.0001).is_sign_positive());
    }
}

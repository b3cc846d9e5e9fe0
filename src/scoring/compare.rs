use crate::ratings::{CandidateId, Criterion, Evaluation, RatingSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Thresholds for the agreement statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSettings {
    /// A paired candidate counts as accurate when its gap is at most this
    pub accuracy_threshold: f64,
    /// Gaps strictly above this are reported as large
    pub large_gap_threshold: f64,
}

impl Default for ComparisonSettings {
    fn default() -> Self {
        Self {
            accuracy_threshold: 0.5,
            large_gap_threshold: 1.0,
        }
    }
}

/// Human vs AI score on one dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionGap {
    pub human: f64,
    pub ai: f64,
    pub gap: f64,
}

impl DimensionGap {
    fn between(human: &Evaluation, ai: &Evaluation, criterion: Criterion) -> Self {
        let h = human.score_for(criterion).unwrap_or(0.0);
        let a = ai.score_for(criterion).unwrap_or(0.0);
        Self {
            human: h,
            ai: a,
            gap: (h - a).abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionGaps {
    pub typography: DimensionGap,
    pub layout: DimensionGap,
    pub color: DimensionGap,
}

impl DimensionGaps {
    fn between(human: &Evaluation, ai: &Evaluation) -> Self {
        Self {
            typography: DimensionGap::between(human, ai, Criterion::Typography),
            layout: DimensionGap::between(human, ai, Criterion::LayoutComposition),
            color: DimensionGap::between(human, ai, Criterion::Color),
        }
    }

    pub fn get(&self, criterion: Criterion) -> &DimensionGap {
        match criterion {
            Criterion::Typography => &self.typography,
            Criterion::LayoutComposition => &self.layout,
            Criterion::Color => &self.color,
        }
    }
}

/// Mean per-dimension gap over paired candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionSummary {
    pub typography: f64,
    pub layout: f64,
    pub color: f64,
}

/// One row of the comparison listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateComparison {
    pub candidate_id: CandidateId,
    pub human_score: Option<f64>,
    pub ai_score: Option<f64>,
    /// Only set when both sides rated the candidate
    pub gap: Option<f64>,
    pub has_human: bool,
    pub has_ai: bool,
    pub dimensions: Option<DimensionGaps>,
}

impl CandidateComparison {
    pub fn is_paired(&self) -> bool {
        self.has_human && self.has_ai
    }
}

/// Agreement statistics between a human and an AI rating set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Union of both sets, ascending candidate id
    pub candidates: Vec<CandidateComparison>,
    pub average_gap: f64,
    /// Mean of `ai - human`; positive means the AI rates higher
    pub bias: f64,
    pub correlation: f64,
    /// Percentage of paired candidates within the accuracy threshold
    pub accuracy_rate: f64,
    pub large_gap_count: usize,
    pub total_candidates: usize,
    pub evaluated_by_both: usize,
    pub dimension_average_gaps: DimensionSummary,
    pub settings: ComparisonSettings,
}

impl ComparisonReport {
    pub fn paired(&self) -> impl Iterator<Item = &CandidateComparison> {
        self.candidates.iter().filter(|c| c.is_paired())
    }

    /// Paired candidates by ascending gap; unpaired ones are left out
    pub fn sorted_by_gap(&self) -> Vec<&CandidateComparison> {
        let mut rows: Vec<&CandidateComparison> = self.paired().collect();
        rows.sort_by(|a, b| {
            a.gap
                .unwrap_or(0.0)
                .total_cmp(&b.gap.unwrap_or(0.0))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        rows
    }
}

/// Compare two rating sets over the union of their candidates.
///
/// Candidates rated on only one side are listed but excluded from every
/// aggregate. All aggregates are 0 when nothing is paired.
pub fn compare_rating_sets(
    human: &RatingSet,
    ai: &RatingSet,
    settings: &ComparisonSettings,
) -> ComparisonReport {
    let universe: BTreeSet<&CandidateId> = human.keys().chain(ai.keys()).collect();

    let candidates: Vec<CandidateComparison> = universe
        .into_iter()
        .map(|id| {
            let h = human.get(id);
            let a = ai.get(id);
            let (gap, dimensions) = match (h, a) {
                (Some(h), Some(a)) => (
                    Some((h.overall_weighted_score - a.overall_weighted_score).abs()),
                    Some(DimensionGaps::between(h, a)),
                ),
                _ => (None, None),
            };
            CandidateComparison {
                candidate_id: id.clone(),
                human_score: h.map(|e| e.overall_weighted_score),
                ai_score: a.map(|e| e.overall_weighted_score),
                gap,
                has_human: h.is_some(),
                has_ai: a.is_some(),
                dimensions,
            }
        })
        .collect();

    let paired: Vec<&CandidateComparison> = candidates.iter().filter(|c| c.is_paired()).collect();
    let gaps: Vec<f64> = paired.iter().filter_map(|c| c.gap).collect();
    let human_scores: Vec<f64> = paired.iter().filter_map(|c| c.human_score).collect();
    let ai_scores: Vec<f64> = paired.iter().filter_map(|c| c.ai_score).collect();

    let signed: Vec<f64> = ai_scores
        .iter()
        .zip(&human_scores)
        .map(|(a, h)| a - h)
        .collect();

    let accurate = gaps.iter().filter(|g| **g <= settings.accuracy_threshold).count();
    let accuracy_rate = if gaps.is_empty() {
        0.0
    } else {
        accurate as f64 / gaps.len() as f64 * 100.0
    };

    let dimension_mean = |criterion: Criterion| {
        mean(
            &paired
                .iter()
                .filter_map(|c| c.dimensions.map(|d| d.get(criterion).gap))
                .collect::<Vec<_>>(),
        )
    };

    ComparisonReport {
        average_gap: mean(&gaps),
        bias: mean(&signed),
        correlation: pearson(&human_scores, &ai_scores),
        accuracy_rate,
        large_gap_count: gaps.iter().filter(|g| **g > settings.large_gap_threshold).count(),
        total_candidates: candidates.len(),
        evaluated_by_both: paired.len(),
        dimension_average_gaps: DimensionSummary {
            typography: dimension_mean(Criterion::Typography),
            layout: dimension_mean(Criterion::LayoutComposition),
            color: dimension_mean(Criterion::Color),
        },
        settings: *settings,
        candidates,
    }
}

/// Arithmetic mean, 0 for an empty slice
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Pearson correlation; 0 when empty or when either side has no variance
pub(crate) fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n == 0 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mean_x = mean(x);
    let mean_y = mean(y);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    (cov / denominator).clamp(-1.0, 1.0)
}

/// Order in which the evaluation view walks through candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    Numerical,
    Gap,
}

/// Candidate ids `1..=candidate_count` plus any extra ids in either set.
///
/// In gap mode, paired candidates come first by descending gap; the rest
/// follow in id order.
pub fn navigation_order(
    human: &RatingSet,
    ai: &RatingSet,
    mode: SortMode,
    candidate_count: u32,
) -> Vec<CandidateId> {
    let universe: BTreeSet<CandidateId> = (1..=candidate_count)
        .map(CandidateId::from)
        .chain(human.keys().cloned())
        .chain(ai.keys().cloned())
        .collect();

    let mut ids: Vec<CandidateId> = universe.into_iter().collect();
    if mode == SortMode::Gap {
        let gap = |id: &CandidateId| match (human.get(id), ai.get(id)) {
            (Some(h), Some(a)) => Some((h.overall_weighted_score - a.overall_weighted_score).abs()),
            _ => None,
        };
        ids.sort_by(|a, b| {
            let by_gap = match (gap(a), gap(b)) {
                (Some(ga), Some(gb)) => gb.total_cmp(&ga),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_gap.then_with(|| a.cmp(b))
        });
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::{Criteria, CriterionScore};

    fn evaluation(id: u32, overall: f64) -> Evaluation {
        let mut e = Evaluation::new(CandidateId::from(id), 3.0);
        e.overall_weighted_score = overall;
        e
    }

    fn set(entries: &[(u32, f64)]) -> RatingSet {
        entries
            .iter()
            .map(|(id, score)| (CandidateId::from(*id), evaluation(*id, *score)))
            .collect()
    }

    #[test]
    fn test_empty_sets() {
        let report = compare_rating_sets(&RatingSet::new(), &RatingSet::new(), &ComparisonSettings::default());
        assert_eq!(report.average_gap, 0.0);
        assert_eq!(report.correlation, 0.0);
        assert_eq!(report.bias, 0.0);
        assert_eq!(report.accuracy_rate, 0.0);
        assert_eq!(report.large_gap_count, 0);
        assert!(report.candidates.is_empty());
    }

    #[test]
    fn test_unpaired_candidate_listed_but_excluded() {
        let human = set(&[(1, 3.0), (2, 4.0), (3, 2.0)]);
        let ai = set(&[(1, 3.5), (2, 3.0)]);
        let report = compare_rating_sets(&human, &ai, &ComparisonSettings::default());

        assert_eq!(report.total_candidates, 3);
        assert_eq!(report.evaluated_by_both, 2);
        let only_human = report
            .candidates
            .iter()
            .find(|c| c.candidate_id == CandidateId::from(3))
            .unwrap();
        assert_eq!(only_human.gap, None);
        assert_eq!(only_human.human_score, Some(2.0));
        assert_eq!(only_human.ai_score, None);
        assert!(only_human.dimensions.is_none());

        // gaps 0.5 and 1.0
        assert!((report.average_gap - 0.75).abs() < 1e-9);
        // (0.5 + -1.0) / 2
        assert!((report.bias - -0.25).abs() < 1e-9);
        assert!((report.accuracy_rate - 50.0).abs() < 1e-9);
        assert_eq!(report.large_gap_count, 0);
    }

    #[test]
    fn test_universe_sorted_numerically() {
        let human = set(&[(10, 3.0), (2, 4.0)]);
        let ai = set(&[(1, 3.5)]);
        let report = compare_rating_sets(&human, &ai, &ComparisonSettings::default());
        let ids: Vec<&str> = report.candidates.iter().map(|c| c.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_correlation_identical_and_constant() {
        assert!((pearson(&[1.0, 2.5, 4.0], &[1.0, 2.5, 4.0]) - 1.0).abs() < 1e-9);
        assert!((pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]) + 1.0).abs() < 1e-9);
        assert_eq!(pearson(&[3.0, 3.0, 3.0], &[3.0, 3.0, 3.0]), 0.0);
        assert_eq!(pearson(&[1.0, 2.0], &[4.0, 4.0]), 0.0);
        assert_eq!(pearson(&[], &[]), 0.0);
    }

    #[test]
    fn test_large_gap_and_threshold() {
        let human = set(&[(1, 1.0), (2, 3.0), (3, 4.0)]);
        let ai = set(&[(1, 2.5), (2, 3.25), (3, 4.0)]);
        let report = compare_rating_sets(&human, &ai, &ComparisonSettings::default());
        assert_eq!(report.large_gap_count, 1);
        assert!((report.accuracy_rate - 200.0 / 3.0).abs() < 1e-9);

        let strict = ComparisonSettings {
            accuracy_threshold: 0.1,
            ..Default::default()
        };
        let report = compare_rating_sets(&human, &ai, &strict);
        assert!((report.accuracy_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_gaps() {
        let mut h = evaluation(1, 3.0);
        h.criteria = Criteria {
            typography: Some(CriterionScore::new(4.0, 5.0)),
            layout_composition: Some(CriterionScore::new(2.0, 5.0)),
            color: None,
        };
        let mut a = evaluation(1, 3.0);
        a.criteria = Criteria::uniform(3.0, 4.0);

        let human: RatingSet = [(CandidateId::from(1), h)].into_iter().collect();
        let ai: RatingSet = [(CandidateId::from(1), a)].into_iter().collect();
        let report = compare_rating_sets(&human, &ai, &ComparisonSettings::default());

        let dims = report.candidates[0].dimensions.unwrap();
        assert_eq!(dims.typography.gap, 1.0);
        assert_eq!(dims.layout.gap, 1.0);
        // missing dimension compares as 0
        assert_eq!(dims.color.gap, 3.0);
        assert_eq!(report.dimension_average_gaps.color, 3.0);
        // overall scores agree even though dimensions differ
        assert_eq!(report.average_gap, 0.0);
    }

    #[test]
    fn test_sorted_by_gap_excludes_unpaired() {
        let human = set(&[(1, 3.0), (2, 4.0), (3, 2.0), (4, 1.0)]);
        let ai = set(&[(1, 4.5), (2, 4.25), (3, 2.0)]);
        let report = compare_rating_sets(&human, &ai, &ComparisonSettings::default());
        let order: Vec<&str> = report
            .sorted_by_gap()
            .iter()
            .map(|c| c.candidate_id.as_str())
            .collect();
        assert_eq!(order, vec!["3", "2", "1"]);
    }

    #[test]
    fn test_order_independent() {
        let human = set(&[(1, 3.0), (2, 4.0), (3, 2.0)]);
        let ai = set(&[(3, 2.5), (1, 3.5), (2, 3.0)]);
        let forward = compare_rating_sets(&human, &ai, &ComparisonSettings::default());

        let mut reversed_ai = RatingSet::new();
        for (id, e) in ai.iter().rev() {
            reversed_ai.insert(id.clone(), e.clone());
        }
        let backward = compare_rating_sets(&human, &reversed_ai, &ComparisonSettings::default());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_navigation_order() {
        let human = set(&[(1, 3.0), (2, 4.0), (3, 2.0)]);
        let ai = set(&[(1, 3.5), (2, 2.0), (3, 2.5)]);

        let numerical = navigation_order(&human, &ai, SortMode::Numerical, 5);
        let ids: Vec<&str> = numerical.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

        // gaps: 1 -> 0.5, 2 -> 2.0, 3 -> 0.5
        let by_gap = navigation_order(&human, &ai, SortMode::Gap, 5);
        let ids: Vec<&str> = by_gap.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3", "4", "5"]);
    }

    #[test]
    fn test_navigation_includes_extra_ids() {
        let human = set(&[(60, 3.0)]);
        let order = navigation_order(&human, &RatingSet::new(), SortMode::Numerical, 2);
        let ids: Vec<&str> = order.iter().map(|c| c.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "60"]);
    }
}

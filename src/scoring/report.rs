//! Detailed gap analysis of one AI run against the human ratings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::compare::{compare_rating_sets, mean, ComparisonReport, ComparisonSettings, DimensionGaps};
use crate::ratings::{CandidateId, Criterion, RatingSet};

const TOP_GAP_COUNT: usize = 10;
const WORST_PER_CATEGORY: usize = 3;
const LARGE_GAP: f64 = 1.5;
const SMALL_GAP: f64 = 0.5;
const BLINDSPOT_MISSES: usize = 2;
const OVERRATING_SHARE: f64 = 0.7;

/// Direction in which the AI deviates from the human ratings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeniencyLabel {
    Lenient,
    Strict,
}

impl LeniencyLabel {
    fn from_sums(ai: f64, human: f64) -> Self {
        if ai > human {
            LeniencyLabel::Lenient
        } else {
            LeniencyLabel::Strict
        }
    }
}

impl fmt::Display for LeniencyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeniencyLabel::Lenient => write!(f, "lenient"),
            LeniencyLabel::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub average_gap: f64,
    pub median_gap: f64,
    pub ai_average_score: f64,
    pub human_average_score: f64,
    pub ai_bias: LeniencyLabel,
    pub bias_magnitude: f64,
    pub correlation: f64,
    pub accuracy_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapDistribution {
    /// gap >= 1.5
    pub large: usize,
    /// 0.5 <= gap < 1.5
    pub medium: usize,
    /// gap < 0.5
    pub small: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAnalysis {
    pub avg_gap: f64,
    pub ai_avg: f64,
    pub human_avg: f64,
    pub ai_bias: LeniencyLabel,
    pub worst_gaps: Vec<CandidateId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedFlagAnalysis {
    pub human_flagged: usize,
    pub ai_flagged: usize,
    pub missed_by_ai: Vec<CandidateId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopGapCandidate {
    pub candidate_id: CandidateId,
    pub overall_gap: f64,
    pub human_score: f64,
    pub ai_score: f64,
    pub image_file: String,
    pub gap_breakdown: DimensionGaps,
    pub human_flags: BTreeSet<String>,
    pub ai_flags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPatterns {
    pub ai_overrating_frequency: f64,
    pub common_ai_blindspots: Vec<String>,
    pub most_problematic_categories: Vec<Criterion>,
}

/// Full gap analysis for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapReport {
    pub source: String,
    pub generated_at: DateTime<Utc>,
    pub total_candidates_analyzed: usize,
    pub candidates_with_both_ratings: usize,
    pub overall: OverallMetrics,
    pub gap_distribution: GapDistribution,
    pub category_analysis: BTreeMap<Criterion, CategoryAnalysis>,
    pub red_flag_analysis: BTreeMap<String, RedFlagAnalysis>,
    pub top_gap_candidates: Vec<TopGapCandidate>,
    pub key_patterns: KeyPatterns,
}

impl GapReport {
    /// Analyse `ai` against `human`, tracking the given red flag ids
    pub fn build(
        source: &str,
        human: &RatingSet,
        ai: &RatingSet,
        flag_ids: &[String],
        settings: &ComparisonSettings,
    ) -> Self {
        let comparison = compare_rating_sets(human, ai, settings);
        Self::from_comparison(source, &comparison, human, ai, flag_ids)
    }

    pub fn from_comparison(
        source: &str,
        comparison: &ComparisonReport,
        human: &RatingSet,
        ai: &RatingSet,
        flag_ids: &[String],
    ) -> Self {
        let paired: Vec<_> = comparison.paired().collect();
        let gaps: Vec<f64> = paired.iter().filter_map(|c| c.gap).collect();
        let human_scores: Vec<f64> = paired.iter().filter_map(|c| c.human_score).collect();
        let ai_scores: Vec<f64> = paired.iter().filter_map(|c| c.ai_score).collect();

        let human_sum: f64 = human_scores.iter().sum();
        let ai_sum: f64 = ai_scores.iter().sum();
        let bias_magnitude = if paired.is_empty() {
            0.0
        } else {
            (ai_sum - human_sum).abs() / paired.len() as f64
        };

        let overall = OverallMetrics {
            average_gap: comparison.average_gap,
            median_gap: upper_median(&gaps),
            ai_average_score: mean(&ai_scores),
            human_average_score: mean(&human_scores),
            ai_bias: LeniencyLabel::from_sums(ai_sum, human_sum),
            bias_magnitude,
            correlation: comparison.correlation,
            accuracy_rate: comparison.accuracy_rate,
        };

        let mut gap_distribution = GapDistribution::default();
        for gap in &gaps {
            if *gap >= LARGE_GAP {
                gap_distribution.large += 1;
            } else if *gap >= SMALL_GAP {
                gap_distribution.medium += 1;
            } else {
                gap_distribution.small += 1;
            }
        }

        let mut category_analysis = BTreeMap::new();
        for criterion in Criterion::ALL {
            let rows: Vec<(&CandidateId, f64, f64, f64)> = paired
                .iter()
                .filter_map(|c| {
                    c.dimensions.map(|d| {
                        let dim = d.get(criterion);
                        (&c.candidate_id, dim.gap, dim.ai, dim.human)
                    })
                })
                .collect();

            let cat_gaps: Vec<f64> = rows.iter().map(|r| r.1).collect();
            let ai_vals: Vec<f64> = rows.iter().map(|r| r.2).collect();
            let human_vals: Vec<f64> = rows.iter().map(|r| r.3).collect();

            let mut worst = rows.clone();
            worst.sort_by(|a, b| b.1.total_cmp(&a.1));

            category_analysis.insert(
                criterion,
                CategoryAnalysis {
                    avg_gap: mean(&cat_gaps),
                    ai_avg: mean(&ai_vals),
                    human_avg: mean(&human_vals),
                    ai_bias: LeniencyLabel::from_sums(ai_vals.iter().sum(), human_vals.iter().sum()),
                    worst_gaps: worst
                        .into_iter()
                        .take(WORST_PER_CATEGORY)
                        .map(|r| r.0.clone())
                        .collect(),
                },
            );
        }

        let mut red_flag_analysis = BTreeMap::new();
        for flag in flag_ids {
            let mut analysis = RedFlagAnalysis::default();
            for (id, human_eval) in human {
                let Some(ai_eval) = ai.get(id) else {
                    continue;
                };
                let human_has = human_eval.red_flags.contains(flag);
                let ai_has = ai_eval.red_flags.contains(flag);
                if human_has {
                    analysis.human_flagged += 1;
                    if !ai_has {
                        analysis.missed_by_ai.push(id.clone());
                    }
                }
                if ai_has {
                    analysis.ai_flagged += 1;
                }
            }
            red_flag_analysis.insert(flag.clone(), analysis);
        }

        let mut by_gap = paired.clone();
        by_gap.sort_by(|a, b| b.gap.unwrap_or(0.0).total_cmp(&a.gap.unwrap_or(0.0)));
        let top_gap_candidates: Vec<TopGapCandidate> = by_gap
            .iter()
            .take(TOP_GAP_COUNT)
            .filter_map(|c| {
                let h = human.get(&c.candidate_id)?;
                let a = ai.get(&c.candidate_id)?;
                Some(TopGapCandidate {
                    candidate_id: c.candidate_id.clone(),
                    overall_gap: c.gap.unwrap_or(0.0),
                    human_score: h.overall_weighted_score,
                    ai_score: a.overall_weighted_score,
                    image_file: c.candidate_id.image_filename(),
                    gap_breakdown: c.dimensions?,
                    human_flags: h.red_flags.clone(),
                    ai_flags: a.red_flags.clone(),
                })
            })
            .collect();

        let overrated = paired
            .iter()
            .filter(|c| c.ai_score.unwrap_or(0.0) > c.human_score.unwrap_or(0.0))
            .count();
        let ai_overrating_frequency = if paired.is_empty() {
            0.0
        } else {
            overrated as f64 / paired.len() as f64
        };

        let missed = |flag: &str| {
            red_flag_analysis
                .get(flag)
                .map_or(0, |a: &RedFlagAnalysis| a.missed_by_ai.len())
        };
        let mut blindspots = Vec::new();
        if missed("template_scent_high") > BLINDSPOT_MISSES {
            blindspots.push("Template detection: AI misses obvious template usage".to_string());
        }
        if missed("sloppy_images") > BLINDSPOT_MISSES {
            blindspots.push("Sloppy execution: AI reads careless work as clean".to_string());
        }
        if ai_overrating_frequency > OVERRATING_SHARE {
            blindspots.push("Generic design: AI rates safe, basic choices too highly".to_string());
        }

        let mut most_problematic_categories: Vec<Criterion> = Criterion::ALL.to_vec();
        most_problematic_categories.sort_by(|a, b| {
            category_analysis[b]
                .avg_gap
                .total_cmp(&category_analysis[a].avg_gap)
        });

        Self {
            source: source.to_string(),
            generated_at: Utc::now(),
            total_candidates_analyzed: ai.len(),
            candidates_with_both_ratings: paired.len(),
            overall,
            gap_distribution,
            category_analysis,
            red_flag_analysis,
            top_gap_candidates,
            key_patterns: KeyPatterns {
                ai_overrating_frequency,
                common_ai_blindspots: blindspots,
                most_problematic_categories,
            },
        }
    }

    /// Markdown summary for the terminal
    pub fn render_text(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("# Gap Analysis Report: {}\n\n", self.source));
        report.push_str(&format!("Generated: {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!(
            "Candidates analyzed: {} ({} rated by both)\n\n",
            self.total_candidates_analyzed, self.candidates_with_both_ratings
        ));

        let m = &self.overall;
        report.push_str("## Overall Metrics\n\n");
        report.push_str(&format!("- Average Gap: {:.3}\n", m.average_gap));
        report.push_str(&format!("- Median Gap: {:.3}\n", m.median_gap));
        report.push_str(&format!("- Correlation: {:.3}\n", m.correlation));
        report.push_str(&format!("- Accuracy (within threshold): {:.1}%\n", m.accuracy_rate));
        report.push_str(&format!(
            "- AI Average: {:.2} / Human Average: {:.2}\n",
            m.ai_average_score, m.human_average_score
        ));
        report.push_str(&format!(
            "- AI Bias: {} ({:.3} per candidate)\n\n",
            m.ai_bias, m.bias_magnitude
        ));

        let d = &self.gap_distribution;
        report.push_str("## Gap Distribution\n\n");
        report.push_str(&format!("- Large (>= 1.5): {}\n", d.large));
        report.push_str(&format!("- Medium (0.5 - 1.5): {}\n", d.medium));
        report.push_str(&format!("- Small (< 0.5): {}\n\n", d.small));

        report.push_str("## Categories\n\n");
        report.push_str("| Category | Avg Gap | AI Avg | Human Avg | AI Bias | Worst |\n");
        report.push_str("|----------|---------|--------|-----------|---------|-------|\n");
        for (criterion, analysis) in &self.category_analysis {
            let worst: Vec<String> = analysis.worst_gaps.iter().map(|c| c.to_string()).collect();
            report.push_str(&format!(
                "| {} | {:.2} | {:.2} | {:.2} | {} | {} |\n",
                criterion,
                analysis.avg_gap,
                analysis.ai_avg,
                analysis.human_avg,
                analysis.ai_bias,
                worst.join(", ")
            ));
        }
        report.push('\n');

        if !self.red_flag_analysis.is_empty() {
            report.push_str("## Red Flags\n\n");
            for (flag, analysis) in &self.red_flag_analysis {
                let missed: Vec<String> = analysis.missed_by_ai.iter().map(|c| c.to_string()).collect();
                report.push_str(&format!(
                    "- {}: human {}, AI {}, missed by AI [{}]\n",
                    flag,
                    analysis.human_flagged,
                    analysis.ai_flagged,
                    missed.join(", ")
                ));
            }
            report.push('\n');
        }

        report.push_str("## Largest Gaps\n\n");
        for candidate in &self.top_gap_candidates {
            report.push_str(&format!(
                "- Candidate {}: gap {:.2} (human {:.2}, AI {:.2})\n",
                candidate.candidate_id, candidate.overall_gap, candidate.human_score, candidate.ai_score
            ));
        }
        report.push('\n');

        report.push_str("## Key Patterns\n\n");
        report.push_str(&format!(
            "- AI over-rates {:.0}% of candidates\n",
            self.key_patterns.ai_overrating_frequency * 100.0
        ));
        for blindspot in &self.key_patterns.common_ai_blindspots {
            report.push_str(&format!("- {}\n", blindspot));
        }

        report
    }
}

/// Element at `len / 2` of the sorted values, 0 when empty
fn upper_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[sorted.len() / 2]
}

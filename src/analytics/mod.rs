//! Comparison of every AI run against the human ratings

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ratings::{RatingSet, RubricDefinition, RunSummary, ScoreScale};
use crate::scoring::{
    compare_rating_sets, ComparisonReport, ComparisonSettings, PenaltyTable, ScoreEngine,
};
use crate::store::{RatingStore, StoreResult};

/// One run's statistics against the human ratings
#[derive(Debug, Clone, Serialize)]
pub struct RunAnalytics {
    pub run: RunSummary,
    pub report: ComparisonReport,
}

/// Every analysed run, with the size of the human set they were compared to
#[derive(Debug, Clone, Serialize)]
pub struct RunsAnalysis {
    pub human_ratings: usize,
    pub runs: Vec<RunAnalytics>,
}

/// Score engine with the rubric's penalties, or the built-in table when the
/// rubric cannot be read
pub async fn load_engine<S: RatingStore>(store: &S, scale: ScoreScale) -> ScoreEngine {
    let penalties = match store.rubric().await {
        Ok(rubric) => PenaltyTable::from_rubric(&rubric),
        Err(e) if e.is_not_found() => {
            debug!("No rubric, using default penalties");
            PenaltyTable::default()
        }
        Err(e) => {
            warn!("Failed to load rubric, using default penalties: {}", e);
            PenaltyTable::default()
        }
    };
    ScoreEngine::new(penalties, scale)
}

/// Red flag ids a gap report tracks: the rubric catalog, else the defaults
pub fn tracked_red_flags(rubric: Option<&RubricDefinition>) -> Vec<String> {
    match rubric {
        Some(rubric) if !rubric.red_flags.is_empty() => rubric.red_flag_ids(),
        _ => PenaltyTable::default().flag_ids(),
    }
}

/// Read a run's evaluations, substituting an empty set on failure
pub async fn load_run_ratings<S: RatingStore>(store: &S, run: &str) -> RatingSet {
    match store.run_evaluations(run).await {
        Ok(ratings) => ratings,
        Err(e) => {
            warn!("Using empty ratings for run {}: {}", run, e);
            RatingSet::new()
        }
    }
}

/// Compare each listed run with the human ratings.
///
/// Hidden runs are dropped unless `show_hidden`. Runs are read concurrently;
/// a run that cannot be read is compared as if it had no ratings. Results
/// keep the listing order. The human ratings are read once for all runs.
pub async fn analyze_runs<S: RatingStore>(
    store: &S,
    show_hidden: bool,
    settings: &ComparisonSettings,
) -> StoreResult<RunsAnalysis> {
    let human = store.human_ratings().await?;
    let runs: Vec<RunSummary> = store
        .list_runs()
        .await?
        .into_iter()
        .filter(|run| show_hidden || !run.hide_from_dashboard)
        .collect();

    debug!("Analyzing {} runs against {} human ratings", runs.len(), human.len());

    let ratings = join_all(runs.iter().map(|run| load_run_ratings(store, &run.filename))).await;

    let runs = runs
        .into_iter()
        .zip(ratings)
        .map(|(run, ai)| RunAnalytics {
            report: compare_rating_sets(&human, &ai, settings),
            run,
        })
        .collect();

    Ok(RunsAnalysis {
        human_ratings: human.len(),
        runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratings::{CandidateId, Criteria, Evaluation};
    use crate::store::StoreError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory store; runs mapped to `None` fail to read
    #[derive(Default)]
    struct MemoryStore {
        human: RatingSet,
        human_reads: std::sync::atomic::AtomicUsize,
        runs: Mutex<Vec<RunSummary>>,
        ratings: BTreeMap<String, Option<RatingSet>>,
    }

    impl MemoryStore {
        fn add_run(&mut self, filename: &str, timestamp: &str, ratings: Option<RatingSet>) {
            let mut run = RunSummary::from_metadata(filename, None);
            run.timestamp = timestamp.to_string();
            self.runs.get_mut().unwrap().push(run);
            self.ratings.insert(filename.to_string(), ratings);
        }
    }

    impl RatingStore for MemoryStore {
        async fn human_ratings(&self) -> StoreResult<RatingSet> {
            self.human_reads
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.human.clone())
        }

        async fn get_human_evaluation(&self, id: &CandidateId) -> StoreResult<Option<Evaluation>> {
            Ok(self.human.get(id).cloned())
        }

        async fn put_human_evaluation(&self, _id: &CandidateId, _e: Evaluation) -> StoreResult<()> {
            Err(StoreError::Validation("read only".to_string()))
        }

        async fn list_runs(&self) -> StoreResult<Vec<RunSummary>> {
            let mut runs = self.runs.lock().unwrap().clone();
            crate::ratings::sort_runs(&mut runs);
            Ok(runs)
        }

        async fn run_evaluations(&self, run: &str) -> StoreResult<RatingSet> {
            match self.ratings.get(run) {
                Some(Some(ratings)) => Ok(ratings.clone()),
                Some(None) => Err(StoreError::Validation(format!("{} is corrupt", run))),
                None => Err(StoreError::not_found(run)),
            }
        }

        async fn set_run_visibility(&self, run: &str, hidden: bool) -> StoreResult<RunSummary> {
            let mut runs = self.runs.lock().unwrap();
            let entry = runs
                .iter_mut()
                .find(|r| r.filename == run)
                .ok_or_else(|| StoreError::not_found(run))?;
            entry.hide_from_dashboard = hidden;
            Ok(entry.clone())
        }

        async fn rubric(&self) -> StoreResult<RubricDefinition> {
            Err(StoreError::not_found("rubric"))
        }
    }

    fn rating(id: u32, score: f64) -> (CandidateId, Evaluation) {
        let mut e = Evaluation::new(CandidateId::from(id), 3.0);
        e.criteria = Criteria::uniform(score, 3.0);
        e.overall_weighted_score = score;
        (CandidateId::from(id), e)
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore {
            human: [rating(1, 4.0), rating(2, 2.0)].into_iter().collect(),
            ..Default::default()
        };
        store.add_run(
            "evaluation_good.json",
            "2025-03-01T09:00:00",
            Some([rating(1, 4.0), rating(2, 2.0)].into_iter().collect()),
        );
        store.add_run("evaluation_broken.json", "2025-02-01T09:00:00", None);
        store.add_run(
            "evaluation_lenient.json",
            "2025-01-01T09:00:00",
            Some([rating(1, 5.0), rating(2, 3.0)].into_iter().collect()),
        );
        store
    }

    #[tokio::test]
    async fn test_failed_run_does_not_block_others() {
        let store = store();
        let analysis = analyze_runs(&store, false, &ComparisonSettings::default())
            .await
            .unwrap();
        assert_eq!(analysis.human_ratings, 2);
        let results = analysis.runs;

        let names: Vec<&str> = results.iter().map(|r| r.run.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["evaluation_good.json", "evaluation_broken.json", "evaluation_lenient.json"]
        );

        assert_eq!(results[0].report.average_gap, 0.0);
        assert_eq!(results[0].report.accuracy_rate, 100.0);

        assert_eq!(results[1].report.evaluated_by_both, 0);
        assert_eq!(results[1].report.total_candidates, 2);

        assert_eq!(results[2].report.average_gap, 1.0);
        assert_eq!(results[2].report.bias, 1.0);
    }

    #[tokio::test]
    async fn test_human_ratings_read_once() {
        let store = store();
        let analysis = analyze_runs(&store, true, &ComparisonSettings::default())
            .await
            .unwrap();

        assert_eq!(store.human_reads.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(analysis.human_ratings, store.human.len());
        assert_eq!(analysis.runs.len(), 3);
        assert!(analysis.runs.iter().all(|r| r.report.total_candidates >= 2));
    }

    #[tokio::test]
    async fn test_hidden_runs_filtered() {
        let store = store();
        store
            .set_run_visibility("evaluation_lenient.json", true)
            .await
            .unwrap();

        let visible = analyze_runs(&store, false, &ComparisonSettings::default())
            .await
            .unwrap()
            .runs;
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|r| !r.run.hide_from_dashboard));

        let all = analyze_runs(&store, true, &ComparisonSettings::default())
            .await
            .unwrap()
            .runs;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_visibility_toggle_twice_restores() {
        let store = store();
        let before = store.list_runs().await.unwrap();

        store.set_run_visibility("evaluation_good.json", true).await.unwrap();
        store.set_run_visibility("evaluation_good.json", false).await.unwrap();

        assert_eq!(store.list_runs().await.unwrap(), before);
        assert!(store
            .set_run_visibility("evaluation_missing.json", true)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_engine_without_rubric_uses_defaults() {
        let store = store();
        let engine = load_engine(&store, ScoreScale::FIVE_POINT).await;
        assert_eq!(engine.penalties(), &PenaltyTable::default());
        assert_eq!(
            tracked_red_flags(None),
            vec!["process_soup", "sloppy_images", "template_scent_high"]
        );

        let rubric = RubricDefinition::from_value(serde_json::json!({
            "red_flags": ["stock_photos: Stock imagery"]
        }))
        .unwrap();
        assert_eq!(tracked_red_flags(Some(&rubric)), vec!["stock_photos"]);
    }

    #[tokio::test]
    async fn test_load_run_ratings_substitutes_empty() {
        let store = store();
        assert!(load_run_ratings(&store, "evaluation_broken.json").await.is_empty());
        assert!(load_run_ratings(&store, "evaluation_unknown.json").await.is_empty());
        assert_eq!(load_run_ratings(&store, "evaluation_good.json").await.len(), 2);
    }
}

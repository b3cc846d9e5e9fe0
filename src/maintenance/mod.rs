//! Batch rewrites of the rating files: penalty backfill and scale migration

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::ratings::{RatingSet, ScoreScale};
use crate::scoring::ScoreEngine;
use crate::store::{FileRatingStore, RatingStore};

const PENALTY_BACKUP_SUFFIX: &str = ".pre_penalty_backup";

/// Outcome of rescoring one file
#[derive(Debug, Clone, PartialEq)]
pub struct RescoredFile {
    pub name: String,
    pub updated: usize,
    pub penalized: usize,
}

/// Backfill penalty fields in `ratings`; returns (changed, with a penalty)
fn backfill(engine: &ScoreEngine, ratings: &mut RatingSet) -> (usize, usize) {
    let mut updated = 0;
    let mut penalized = 0;
    for evaluation in ratings.values_mut() {
        if engine.backfill_penalty(evaluation) {
            updated += 1;
        }
        if evaluation.penalty_applied.unwrap_or(0.0) > 0.0 {
            penalized += 1;
        }
    }
    (updated, penalized)
}

/// Add `base_weighted_score` and `penalty_applied` to every human and run
/// record that lacks them.
///
/// Each rewritten file is first copied to `<file>.pre_penalty_backup`; an
/// existing backup is never replaced.
pub async fn rescore(
    store: &FileRatingStore,
    engine: &ScoreEngine,
    dry_run: bool,
) -> Result<Vec<RescoredFile>> {
    let mut files = Vec::new();

    let runs = store.list_runs().await?;
    for run in runs.iter().filter(|r| !r.filename.contains("backup")) {
        let mut ratings = match store.run_evaluations(&run.filename).await {
            Ok(ratings) => ratings,
            Err(e) => {
                warn!("Skipping {}: {}", run.filename, e);
                continue;
            }
        };
        let (updated, penalized) = backfill(engine, &mut ratings);

        if !dry_run && updated > 0 {
            store.backup_run(&run.filename, PENALTY_BACKUP_SUFFIX).await?;
            let mut patch = Map::new();
            patch.insert("penalties_applied".to_string(), json!(Utc::now().to_rfc3339()));
            patch.insert("penalty_system_version".to_string(), json!("1.0"));
            store
                .save_run_copy(&run.filename, &run.filename, &ratings, patch)
                .await?;
        }

        files.push(RescoredFile {
            name: run.filename.clone(),
            updated,
            penalized,
        });
    }

    let mut human = store.human_ratings().await?;
    if !human.is_empty() {
        let (updated, penalized) = backfill(engine, &mut human);
        if !dry_run && updated > 0 {
            store.backup_human_ratings(PENALTY_BACKUP_SUFFIX).await?;
            store.put_human_ratings(&human).await?;
        }
        files.push(RescoredFile {
            name: store.paths().human_ratings.display().to_string(),
            updated,
            penalized,
        });
    }

    info!("Rescored {} files", files.len());
    Ok(files)
}

/// `4scale` for a 1-4 scale, `5scale` for 1-5
fn scale_tag(scale: &ScoreScale) -> String {
    format!("{}scale", scale.max)
}

/// Name of the copy of `run` migrated onto `target`, e.g. `<stem>_5scale.json`
pub fn migrated_name(run: &str, target: &ScoreScale) -> String {
    let marker = format!("_{}", scale_tag(target));
    match run.strip_suffix(".json") {
        Some(stem) => format!("{}{}.json", stem, marker),
        None => format!("{}{}", run, marker),
    }
}

fn ensure_distinct(from: &ScoreScale, to: &ScoreScale) -> Result<()> {
    if from == to {
        bail!("Source and target scale are both {}", to);
    }
    Ok(())
}

fn migrate(engine: &ScoreEngine, ratings: &mut RatingSet, from: &ScoreScale) {
    for evaluation in ratings.values_mut() {
        engine.migrate_scale(evaluation, from);
    }
}

/// Convert `run` from `from` onto the engine's scale and write it as
/// `<stem>_<max>scale.json`. Returns the new file name.
pub async fn migrate_run(
    store: &FileRatingStore,
    engine: &ScoreEngine,
    run: &str,
    from: &ScoreScale,
) -> Result<String> {
    let to = engine.scale();
    ensure_distinct(from, &to)?;
    if run.contains(&format!("_{}", scale_tag(&to))) {
        bail!("{} is already migrated", run);
    }

    let mut ratings = store
        .run_evaluations(run)
        .await
        .with_context(|| format!("Failed to read run {}", run))?;
    migrate(engine, &mut ratings, from);

    let target = migrated_name(run, &to);
    let mut patch = Map::new();
    patch.insert("scale_version".to_string(), Value::from(format!("{}-point", to.max)));
    patch.insert(
        format!("migrated_from_{}_scale", from.max),
        json!(Utc::now().to_rfc3339()),
    );
    store.save_run_copy(run, &target, &ratings, patch).await?;

    info!("Migrated {} ({} candidates) to {}", run, ratings.len(), target);
    Ok(target)
}

/// Convert the human ratings in place after backing them up to
/// `<file>.<from max>scale_backup`. Returns the number of records converted.
pub async fn migrate_human(
    store: &FileRatingStore,
    engine: &ScoreEngine,
    from: &ScoreScale,
) -> Result<usize> {
    ensure_distinct(from, &engine.scale())?;
    let mut human = store.human_ratings().await?;
    if human.is_empty() {
        warn!("No human ratings to migrate");
        return Ok(0);
    }

    let suffix = format!(".{}_backup", scale_tag(from));
    store.backup_human_ratings(&suffix).await?;
    migrate(engine, &mut human, from);
    store.put_human_ratings(&human).await?;
    Ok(human.len())
}

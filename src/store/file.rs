//! Rating store backed by flat JSON files

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{validate_filename, RatingStore, StoreError, StoreResult};
use crate::cli::DataPaths;
use crate::ratings::{
    sort_runs, CandidateId, Evaluation, RatingSet, RubricDefinition, RunMetadata, RunSummary,
};

const RUN_PREFIX: &str = "evaluation_";
const METADATA_KEY: &str = "evaluation_metadata";
const RATINGS_KEY: &str = "candidate_ratings";
const PROMPT_KEY: &str = "full_prompt_used";
const HIDE_KEY: &str = "hideFromDashboard";

/// Only the metadata block of a run file
#[derive(Deserialize)]
struct RunHeader {
    #[serde(default)]
    evaluation_metadata: Option<RunMetadata>,
}

/// Store reading and writing the dashboard's JSON files
#[derive(Debug, Clone)]
pub struct FileRatingStore {
    paths: DataPaths,
}

impl FileRatingStore {
    pub fn new(paths: DataPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    fn run_path(&self, run: &str) -> StoreResult<PathBuf> {
        validate_filename(run)?;
        Ok(self.paths.results_dir.join(run))
    }

    /// AI ratings from the legacy single-run file; empty when absent
    pub async fn legacy_ai_ratings(&self) -> StoreResult<RatingSet> {
        match read_json::<Value>(&self.paths.ai_ratings).await {
            Ok(doc) => ratings_from_document(&self.paths.ai_ratings, doc),
            Err(e) if e.is_not_found() => Ok(RatingSet::new()),
            Err(e) => Err(e),
        }
    }

    /// Replace the whole human ratings file
    pub async fn put_human_ratings(&self, ratings: &RatingSet) -> StoreResult<()> {
        write_json(&self.paths.human_ratings, ratings).await
    }

    /// Write `ratings` to `new_run` using `run` as the template, merging
    /// `metadata` into its metadata block. Legacy files without a block are
    /// written without one. `new_run` may equal `run`.
    pub async fn save_run_copy(
        &self,
        run: &str,
        new_run: &str,
        ratings: &RatingSet,
        metadata: Map<String, Value>,
    ) -> StoreResult<PathBuf> {
        let source = self.run_path(run)?;
        let target = self.run_path(new_run)?;
        let mut doc = read_json::<Value>(&source).await?;

        set_ratings(&source, &mut doc, ratings)?;
        if let Some(meta) = doc.get_mut(METADATA_KEY).and_then(Value::as_object_mut) {
            meta.extend(metadata);
        }

        write_json(&target, &doc).await?;
        info!("Saved run copy to {:?}", target);
        Ok(target)
    }

    /// Bytes of a candidate screenshot
    pub async fn candidate_image(&self, filename: &str) -> StoreResult<Vec<u8>> {
        validate_filename(filename)?;
        let path = self.paths.images_dir.join(filename);
        tokio::fs::read(&path)
            .await
            .map_err(|e| StoreError::from_io(&path, e))
    }

    /// Copy the human ratings file aside once; later calls keep the first copy
    pub async fn backup_human_ratings(&self, suffix: &str) -> StoreResult<Option<PathBuf>> {
        backup(&self.paths.human_ratings, suffix).await
    }

    pub async fn backup_run(&self, run: &str, suffix: &str) -> StoreResult<Option<PathBuf>> {
        let path = self.run_path(run)?;
        backup(&path, suffix).await
    }

    async fn read_run_summary(&self, filename: String) -> Option<RunSummary> {
        let path = self.paths.results_dir.join(&filename);
        match read_json::<RunHeader>(&path).await {
            Ok(header) => Some(RunSummary::from_metadata(
                &filename,
                header.evaluation_metadata.as_ref(),
            )),
            Err(e) => {
                warn!("Skipping run {}: {}", filename, e);
                None
            }
        }
    }
}

impl RatingStore for FileRatingStore {
    async fn human_ratings(&self) -> StoreResult<RatingSet> {
        match read_json::<RatingSet>(&self.paths.human_ratings).await {
            Ok(mut ratings) => {
                fill_candidate_ids(&mut ratings);
                Ok(ratings)
            }
            Err(e) if e.is_not_found() => {
                debug!("No human ratings at {:?} yet", self.paths.human_ratings);
                Ok(RatingSet::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_human_evaluation(&self, candidate_id: &CandidateId) -> StoreResult<Option<Evaluation>> {
        Ok(self.human_ratings().await?.remove(candidate_id))
    }

    async fn put_human_evaluation(
        &self,
        candidate_id: &CandidateId,
        mut evaluation: Evaluation,
    ) -> StoreResult<()> {
        // A corrupt file is reported rather than overwritten
        let mut ratings = self.human_ratings().await?;
        evaluation.candidate_id = candidate_id.clone();
        ratings.insert(candidate_id.clone(), evaluation);
        write_json(&self.paths.human_ratings, &ratings).await?;
        info!("Saved human rating for candidate {}", candidate_id);
        Ok(())
    }

    async fn list_runs(&self) -> StoreResult<Vec<RunSummary>> {
        let dir = &self.paths.results_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Results directory {:?} does not exist", dir);
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError::from_io(dir, e)),
        };

        let mut filenames = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::from_io(dir, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(RUN_PREFIX) && name.ends_with(".json") {
                filenames.push(name);
            }
        }

        let mut runs: Vec<RunSummary> =
            join_all(filenames.into_iter().map(|name| self.read_run_summary(name)))
                .await
                .into_iter()
                .flatten()
                .collect();

        sort_runs(&mut runs);
        Ok(runs)
    }

    async fn run_evaluations(&self, run: &str) -> StoreResult<RatingSet> {
        let path = self.run_path(run)?;
        let doc = read_json::<Value>(&path).await?;
        ratings_from_document(&path, doc)
    }

    async fn set_run_visibility(&self, run: &str, hidden: bool) -> StoreResult<RunSummary> {
        let path = self.run_path(run)?;
        let mut doc = match read_json::<Value>(&path).await {
            Err(e) if e.is_not_found() => return Err(StoreError::not_found(format!("run {}", run))),
            other => other?,
        };

        let root = doc
            .as_object_mut()
            .ok_or_else(|| StoreError::Validation(format!("run {} is not a JSON object", run)))?;
        let meta = root
            .entry(METADATA_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !meta.is_object() {
            *meta = Value::Object(Map::new());
        }
        if let Some(meta) = meta.as_object_mut() {
            meta.insert(HIDE_KEY.to_string(), Value::Bool(hidden));
        }

        write_json(&path, &doc).await?;
        info!("Set {} = {} on run {}", HIDE_KEY, hidden, run);

        let metadata: Option<RunMetadata> = match doc.get(METADATA_KEY) {
            Some(meta) => Some(
                serde_json::from_value(meta.clone()).map_err(|e| StoreError::malformed(&path, e))?,
            ),
            None => None,
        };
        Ok(RunSummary::from_metadata(run, metadata.as_ref()))
    }

    async fn rubric(&self) -> StoreResult<RubricDefinition> {
        let path = &self.paths.rubric;
        let raw = read_json::<Value>(path).await?;
        RubricDefinition::from_value(raw).map_err(|e| StoreError::malformed(path, e))
    }
}

/// Extract the ratings from a run or legacy AI document.
///
/// New-style files keep them under `candidate_ratings`; legacy files are the
/// ratings object itself, possibly next to a metadata block.
fn ratings_from_document(path: &Path, doc: Value) -> StoreResult<RatingSet> {
    let ratings = match doc {
        Value::Object(mut root) => match root.remove(RATINGS_KEY) {
            Some(ratings) => ratings,
            None => {
                root.remove(METADATA_KEY);
                root.remove(PROMPT_KEY);
                Value::Object(root)
            }
        },
        other => other,
    };
    let mut ratings: RatingSet =
        serde_json::from_value(ratings).map_err(|e| StoreError::malformed(path, e))?;
    fill_candidate_ids(&mut ratings);
    Ok(ratings)
}

/// Records written without a `candidate_id` take it from their key
fn fill_candidate_ids(ratings: &mut RatingSet) {
    for (id, evaluation) in ratings.iter_mut() {
        if evaluation.candidate_id.as_str().is_empty() {
            evaluation.candidate_id = id.clone();
        }
    }
}

/// Replace the ratings in `doc`, keeping its layout and non-rating keys
fn set_ratings(path: &Path, doc: &mut Value, ratings: &RatingSet) -> StoreResult<()> {
    let value = serde_json::to_value(ratings).map_err(|e| StoreError::malformed(path, e))?;
    let Some(root) = doc.as_object_mut() else {
        *doc = value;
        return Ok(());
    };

    if root.contains_key(RATINGS_KEY) {
        root.insert(RATINGS_KEY.to_string(), value);
    } else {
        root.retain(|key, _| key == METADATA_KEY || key == PROMPT_KEY);
        if let Value::Object(entries) = value {
            root.extend(entries);
        }
    }
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StoreError::from_io(path, e))?;
    serde_json::from_str(&content).map_err(|e| StoreError::malformed(path, e))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::malformed(path, e))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::from_io(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| StoreError::from_io(path, e))
}

async fn backup(path: &Path, suffix: &str) -> StoreResult<Option<PathBuf>> {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    let backup_path = PathBuf::from(name);

    if tokio::fs::try_exists(&backup_path).await.unwrap_or(false) {
        return Ok(None);
    }
    match tokio::fs::copy(path, &backup_path).await {
        Ok(_) => {
            info!("Backed up {:?} to {:?}", path, backup_path);
            Ok(Some(backup_path))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::from_io(path, e)),
    }
}

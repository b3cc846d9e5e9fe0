use crate::ratings::ScoreScale;
use crate::scoring::ComparisonSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the dashboard and the maintenance commands
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Where the rating files live
    #[serde(default)]
    pub data: DataPaths,

    /// Scale and comparison thresholds
    #[serde(default)]
    pub scoring: ScoringSettings,

    /// Web server settings
    #[serde(default)]
    pub server: ServerSettings,
}

/// Locations of the files backing the rating store.
///
/// Relative paths are resolved against the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPaths {
    /// Human ratings, one JSON object keyed by candidate id
    #[serde(default = "default_human_ratings")]
    pub human_ratings: PathBuf,

    /// Legacy single-run AI ratings file
    #[serde(default = "default_ai_ratings")]
    pub ai_ratings: PathBuf,

    /// Directory holding `evaluation_*.json` run files
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,

    #[serde(default = "default_rubric")]
    pub rubric: PathBuf,

    /// Directory holding `candidate_<id>.jpg` screenshots
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            human_ratings: default_human_ratings(),
            ai_ratings: default_ai_ratings(),
            results_dir: default_results_dir(),
            rubric: default_rubric(),
            images_dir: default_images_dir(),
        }
    }
}

fn default_human_ratings() -> PathBuf {
    PathBuf::from("human-ratings.json")
}

fn default_ai_ratings() -> PathBuf {
    PathBuf::from("ai-ratings.json")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("evaluation-results")
}

fn default_rubric() -> PathBuf {
    PathBuf::from("rubric.json")
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("candidate-images")
}

impl DataPaths {
    /// Anchor every relative path at `base`
    pub fn resolve(&self, base: &Path) -> Self {
        let anchor = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            human_ratings: anchor(&self.human_ratings),
            ai_ratings: anchor(&self.ai_ratings),
            results_dir: anchor(&self.results_dir),
            rubric: anchor(&self.rubric),
            images_dir: anchor(&self.images_dir),
        }
    }
}

/// Scoring and comparison settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringSettings {
    /// Current rating scale
    #[serde(default)]
    pub scale: ScoreScale,

    /// Scale that `migrate-scale` converts from
    #[serde(default = "default_legacy_scale")]
    pub legacy_scale: ScoreScale,

    /// Gap at or below which human and AI agree
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,

    /// Gap above which a disagreement is counted as large
    #[serde(default = "default_large_gap_threshold")]
    pub large_gap_threshold: f64,

    /// Number of candidates in the evaluation pool
    #[serde(default = "default_candidate_count")]
    pub candidate_count: u32,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            scale: ScoreScale::default(),
            legacy_scale: default_legacy_scale(),
            accuracy_threshold: default_accuracy_threshold(),
            large_gap_threshold: default_large_gap_threshold(),
            candidate_count: default_candidate_count(),
        }
    }
}

fn default_legacy_scale() -> ScoreScale {
    ScoreScale::FOUR_POINT
}

fn default_accuracy_threshold() -> f64 {
    0.5
}

fn default_large_gap_threshold() -> f64 {
    1.0
}

fn default_candidate_count() -> u32 {
    54
}

impl ScoringSettings {
    pub fn comparison(&self) -> ComparisonSettings {
        ComparisonSettings {
            accuracy_threshold: self.accuracy_threshold,
            large_gap_threshold: self.large_gap_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

impl DashboardConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: DashboardConfig =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .context(format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Self {
            data: DataPaths {
                results_dir: PathBuf::from("./evaluation-results"),
                images_dir: PathBuf::from("./candidate-images"),
                ..Default::default()
            },
            scoring: ScoringSettings::default(),
            server: ServerSettings { port: 3000 },
        }
    }
}

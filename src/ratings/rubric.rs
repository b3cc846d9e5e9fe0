//! Rubric reference data loaded from `rubric.json`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::Criterion;

/// Guidance for one scored dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionRubric {
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "good_indicators")]
    pub good: Vec<String>,
    #[serde(default, alias = "weak_indicators")]
    pub weak: Vec<String>,
}

/// A red flag the rater may tick, with its score penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlagDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Explicit penalty; `None` falls back to the built-in table
    #[serde(default)]
    pub penalty: Option<f64>,
}

/// Catalog entries come either as `"flag_id: description"` or as objects
#[derive(Deserialize)]
#[serde(untagged)]
enum RedFlagEntry {
    Text(String),
    Full(RedFlagDefinition),
}

impl From<RedFlagEntry> for RedFlagDefinition {
    fn from(entry: RedFlagEntry) -> Self {
        match entry {
            RedFlagEntry::Full(def) => def,
            RedFlagEntry::Text(text) => {
                let (id, description) = match text.split_once(':') {
                    Some((id, rest)) => (id.trim(), rest.trim()),
                    None => (text.trim(), ""),
                };
                RedFlagDefinition {
                    id: id.to_string(),
                    description: description.to_string(),
                    penalty: None,
                }
            }
        }
    }
}

/// Parsed view over the rubric file.
///
/// The raw document is kept as-is so the dashboard receives exactly what is
/// on disk.
#[derive(Debug, Clone, Serialize)]
pub struct RubricDefinition {
    pub dimensions: BTreeMap<Criterion, DimensionRubric>,
    pub red_flags: Vec<RedFlagDefinition>,
    #[serde(skip)]
    raw: Value,
}

impl RubricDefinition {
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let body = match raw.get("rubric") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => raw.clone(),
        };

        let red_flags = match body.get("red_flags") {
            Some(list) => serde_json::from_value::<Vec<RedFlagEntry>>(list.clone())?
                .into_iter()
                .map(RedFlagDefinition::from)
                .collect(),
            None => Vec::new(),
        };

        let mut dimensions = BTreeMap::new();
        for criterion in Criterion::ALL {
            let entry = body
                .get("dimensions")
                .and_then(|d| d.get(criterion.key()))
                .or_else(|| body.get(criterion.key()));
            if let Some(entry) = entry.filter(|e| e.is_object()) {
                let parsed: DimensionRubric = serde_json::from_value(entry.clone())?;
                dimensions.insert(criterion, parsed);
            }
        }

        Ok(Self {
            dimensions,
            red_flags,
            raw,
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn red_flag(&self, id: &str) -> Option<&RedFlagDefinition> {
        self.red_flags.iter().find(|f| f.id == id)
    }

    pub fn red_flag_ids(&self) -> Vec<String> {
        self.red_flags.iter().map(|f| f.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_red_flags() {
        let rubric = RubricDefinition::from_value(json!({
            "rubric": {
                "red_flags": [
                    "template_scent_high: Looks like an unmodified template",
                    "process_soup"
                ]
            }
        }))
        .unwrap();

        assert_eq!(rubric.red_flags.len(), 2);
        let template = rubric.red_flag("template_scent_high").unwrap();
        assert_eq!(template.description, "Looks like an unmodified template");
        assert_eq!(template.penalty, None);
        assert_eq!(rubric.red_flag("process_soup").unwrap().description, "");
    }

    #[test]
    fn test_object_red_flags_and_dimensions() {
        let rubric = RubricDefinition::from_value(json!({
            "typography": {"weight": 0.35, "good": ["clear hierarchy"], "weak": ["too many fonts"]},
            "dimensions": {"color": {"weight": 0.3, "good_indicators": ["restrained palette"]}},
            "red_flags": [{"id": "stock_photos", "description": "Stock imagery", "penalty": 0.4}]
        }))
        .unwrap();

        assert_eq!(rubric.red_flag("stock_photos").unwrap().penalty, Some(0.4));
        let typography = &rubric.dimensions[&Criterion::Typography];
        assert_eq!(typography.weight, Some(0.35));
        assert_eq!(typography.weak, vec!["too many fonts".to_string()]);
        assert_eq!(rubric.dimensions[&Criterion::Color].good.len(), 1);
        assert!(!rubric.dimensions.contains_key(&Criterion::LayoutComposition));
        assert_eq!(rubric.raw()["typography"]["weight"], 0.35);
    }

    #[test]
    fn test_malformed_red_flags() {
        assert!(RubricDefinition::from_value(json!({"red_flags": [42]})).is_err());
    }
}

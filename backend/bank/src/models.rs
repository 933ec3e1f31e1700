use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::identity::ModelIdentity;

pub const DATABASE_VERSION: &str = "1.0.0";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub models: Vec<ModelRecord>,
    pub metadata: DatabaseMetadata,
}

/// Missing keys fall back to defaults so that older database files (which
/// carried only `count` and `dataset`) still load.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseMetadata {
    pub version: String,
    #[serde(alias = "count")]
    pub total_models: usize,
    pub last_updated: String,
    pub projection_method: ProjectionMethod,
    pub dna_dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl DatabaseMetadata {
    pub fn new(
        total_models: usize,
        projection_method: ProjectionMethod,
        dna_dimension: usize,
        last_updated: &str,
    ) -> Self {
        Self {
            version: DATABASE_VERSION.to_string(),
            total_models,
            last_updated: last_updated.to_string(),
            projection_method,
            dna_dimension,
            dataset: None,
        }
    }
}

/// One model in the atlas.
///
/// `signature` is `None` when extraction failed upstream. `x`/`y` stay `None`
/// until the first projection run and are replaced wholesale by every run
/// after that.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub family: String,
    pub parameters: Option<String>,
    pub is_instruct: bool,
    pub signature: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default)]
    pub metadata: ModelMetadata,
}

impl ModelRecord {
    pub fn from_raw_id(raw_id: &str, signature: Option<Vec<f64>>) -> Self {
        let ModelIdentity {
            id,
            name,
            organization,
            family,
            parameters,
            is_instruct,
        } = ModelIdentity::parse(raw_id);

        let metadata = ModelMetadata {
            dna_dimension: signature.as_ref().map(Vec::len),
            extra: Map::new(),
        };

        Self {
            id,
            name,
            organization,
            family,
            parameters,
            is_instruct,
            signature,
            x: None,
            y: None,
            metadata,
        }
    }

    pub fn signature(&self) -> Option<&[f64]> {
        self.signature.as_deref()
    }

    pub fn has_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|s| !s.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dna_dimension: Option<usize>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMethod {
    #[default]
    Pca,
    Random,
}

impl ProjectionMethod {
    /// Parses a method name, falling back to PCA on anything unrecognized.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("Unknown projection method {value:?}, falling back to pca");
            Self::default()
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pca => "pca",
            Self::Random => "random",
        }
    }
}

impl FromStr for ProjectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pca" => Ok(Self::Pca),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown projection method: {other}")),
        }
    }
}

impl<'de> Deserialize<'de> for ProjectionMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse_or_default(&value))
    }
}

impl fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

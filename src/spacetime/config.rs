//! Declarative configuration for spacetime aggregation

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::DataType;
use serde::{Deserialize, Serialize};

use super::naming::validate_field;
use super::window::{parse_window, Window};
use crate::error::{PanelError, Result};
use crate::utils::ParallelConfig;

/// Key column(s) identifying a spatial unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SpatialIndexRepr", into = "SpatialIndexRepr")]
pub struct SpatialIndex(Vec<String>);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SpatialIndexRepr {
    Single(String),
    Composite(Vec<String>),
}

impl SpatialIndex {
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() || columns.iter().any(|c| c.is_empty()) {
            return Err(PanelError::Parse(
                "Spatial index needs at least one non-empty column name".to_string(),
            ));
        }
        Ok(Self(columns))
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn is_composite(&self) -> bool {
        self.0.len() > 1
    }
}

impl From<&str> for SpatialIndex {
    fn from(column: &str) -> Self {
        Self(vec![column.to_string()])
    }
}

impl TryFrom<SpatialIndexRepr> for SpatialIndex {
    type Error = PanelError;

    fn try_from(repr: SpatialIndexRepr) -> Result<Self> {
        match repr {
            SpatialIndexRepr::Single(column) => Self::new([column]),
            SpatialIndexRepr::Composite(columns) => Self::new(columns),
        }
    }
}

impl From<SpatialIndex> for SpatialIndexRepr {
    fn from(index: SpatialIndex) -> Self {
        let mut columns = index.0;
        if columns.len() == 1 {
            SpatialIndexRepr::Single(columns.remove(0))
        } else {
            SpatialIndexRepr::Composite(columns)
        }
    }
}

/// A spatial index paired with the windows to aggregate it over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpacedeltasRepr", into = "SpacedeltasRepr")]
pub struct Spacedeltas {
    pub spatial_index: SpatialIndex,
    /// Window token -> parsed window, unique per scope
    pub deltas: BTreeMap<String, Window>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpacedeltasRepr {
    spatial_index: SpatialIndex,
    deltas: Vec<String>,
}

impl Spacedeltas {
    /// Parse `tokens` into windows. Fails on a malformed or repeated token.
    pub fn new(spatial_index: impl Into<SpatialIndex>, tokens: &[&str]) -> Result<Self> {
        Self::from_tokens(spatial_index.into(), tokens.iter().map(|t| t.to_string()))
    }

    fn from_tokens(
        spatial_index: SpatialIndex,
        tokens: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let mut deltas = BTreeMap::new();
        for token in tokens {
            let window = parse_window(&token)?;
            if deltas.insert(token.clone(), window).is_some() {
                return Err(PanelError::Parse(format!("Duplicate delta '{}'", token)));
            }
        }
        if deltas.is_empty() {
            return Err(PanelError::Parse("Spacedeltas need at least one delta".to_string()));
        }
        Ok(Self {
            spatial_index,
            deltas,
        })
    }
}

impl TryFrom<SpacedeltasRepr> for Spacedeltas {
    type Error = PanelError;

    fn try_from(repr: SpacedeltasRepr) -> Result<Self> {
        Self::from_tokens(repr.spatial_index, repr.deltas)
    }
}

impl From<Spacedeltas> for SpacedeltasRepr {
    fn from(sd: Spacedeltas) -> Self {
        Self {
            spatial_index: sd.spatial_index,
            deltas: sd.deltas.into_keys().collect(),
        }
    }
}

/// Space name -> spacedeltas
pub type SpacedeltaMap = BTreeMap<String, Spacedeltas>;

/// Declared dtype of an aggregate column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricDtype {
    Int32,
    Int64,
    UInt32,
    Float32,
    Float64,
    Boolean,
    String,
}

impl MetricDtype {
    pub fn to_dtype(self) -> DataType {
        match self {
            MetricDtype::Int32 => DataType::Int32,
            MetricDtype::Int64 => DataType::Int64,
            MetricDtype::UInt32 => DataType::UInt32,
            MetricDtype::Float32 => DataType::Float32,
            MetricDtype::Float64 => DataType::Float64,
            MetricDtype::Boolean => DataType::Boolean,
            MetricDtype::String => DataType::String,
        }
    }
}

/// Configuration of a [`SpacetimeAggregator`](super::SpacetimeAggregator)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Storage namespace and first field of every panel column name
    pub prefix: String,
    /// As-of dates to aggregate to
    pub dates: Vec<NaiveDate>,
    pub spacedeltas: SpacedeltaMap,
    /// Metric dtypes reapplied after the pivot
    #[serde(default)]
    pub dtypes: HashMap<String, MetricDtype>,
    #[serde(default)]
    pub parallel: ParallelConfig,
}

impl AggregatorConfig {
    pub fn new(prefix: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        Self {
            prefix: prefix.into(),
            dates,
            spacedeltas: BTreeMap::new(),
            dtypes: HashMap::new(),
            parallel: ParallelConfig::default(),
        }
    }

    pub fn with_space(mut self, name: impl Into<String>, spacedeltas: Spacedeltas) -> Self {
        self.spacedeltas.insert(name.into(), spacedeltas);
        self
    }

    pub fn with_dtype(mut self, metric: impl Into<String>, dtype: MetricDtype) -> Self {
        self.dtypes.insert(metric.into(), dtype);
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the configuration before any I/O happens
    pub fn validate(&self) -> Result<()> {
        validate_field("prefix", &self.prefix)?;

        if self.spacedeltas.is_empty() {
            return Err(PanelError::Parse(format!(
                "Aggregator '{}' has no spacedeltas configured",
                self.prefix
            )));
        }
        for (space, sd) in &self.spacedeltas {
            validate_field("space", space)?;
            for token in sd.deltas.keys() {
                validate_field("delta", token)?;
            }
        }

        let mut seen = HashSet::new();
        for date in &self.dates {
            if !seen.insert(date) {
                return Err(PanelError::Parse(format!("Duplicate date {}", date)));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}

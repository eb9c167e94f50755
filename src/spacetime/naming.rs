//! Wide-panel column names: `{prefix}_{space}_{delta}_{metric}`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

const SEPARATOR: char = '_';

/// A generated panel column name, split into its parts.
///
/// `prefix`, `space` and `delta` never contain `_`; the metric may, so a
/// name is always parsed as three fixed fields followed by the metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PanelColumn {
    pub prefix: String,
    pub space: String,
    pub delta: String,
    pub metric: String,
}

impl PanelColumn {
    pub fn new(prefix: &str, space: &str, delta: &str, metric: &str) -> Result<Self> {
        for (field, value) in [("prefix", prefix), ("space", space), ("delta", delta)] {
            validate_field(field, value)?;
        }
        if metric.is_empty() {
            return Err(PanelError::Parse("Panel column metric must not be empty".to_string()));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            space: space.to_string(),
            delta: delta.to_string(),
            metric: metric.to_string(),
        })
    }

    /// Parse a generated column name back into its parts
    pub fn parse(column: &str) -> Result<Self> {
        let invalid = || PanelError::Parse(format!("Not a spacetime column name: '{}'", column));

        let mut parts = column.splitn(4, SEPARATOR);
        let prefix = parts.next().ok_or_else(invalid)?;
        let space = parts.next().ok_or_else(invalid)?;
        let delta = parts.next().ok_or_else(invalid)?;
        let metric = parts.next().ok_or_else(invalid)?;

        Self::new(prefix, space, delta, metric).map_err(|_| invalid())
    }

    /// `{prefix}_{space}_{delta}_`, the part shared by every metric of one
    /// (space, delta) combination
    pub fn spacetime_prefix(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}{sep}",
            self.prefix,
            self.space,
            self.delta,
            sep = SEPARATOR
        )
    }
}

/// Recover `{prefix}_{space}_{delta}_` from a generated column name
pub fn spacetime_prefix(column: &str) -> Result<String> {
    PanelColumn::parse(column).map(|c| c.spacetime_prefix())
}

pub(crate) fn validate_field(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PanelError::Parse(format!("Panel column {} must not be empty", field)));
    }
    if value.contains(SEPARATOR) {
        return Err(PanelError::Parse(format!(
            "Panel column {} '{}' must not contain '{}'",
            field, value, SEPARATOR
        )));
    }
    Ok(())
}

impl fmt::Display for PanelColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.spacetime_prefix(), self.metric)
    }
}

impl FromStr for PanelColumn {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let column = PanelColumn::new("tests", "tract", "3y", "count").unwrap();
        assert_eq!(column.to_string(), "tests_tract_3y_count");
    }

    #[test]
    fn test_parse_metric_with_underscores() {
        let column = PanelColumn::parse("tests_tract_3y_kit_rate_per_100").unwrap();
        assert_eq!(column.prefix, "tests");
        assert_eq!(column.space, "tract");
        assert_eq!(column.delta, "3y");
        assert_eq!(column.metric, "kit_rate_per_100");
    }

    #[test]
    fn test_roundtrip() {
        let column = PanelColumn::new("inspections", "address", "all", "violation_rate").unwrap();
        assert_eq!(column.to_string().parse::<PanelColumn>().unwrap(), column);
    }

    #[test]
    fn test_spacetime_prefix() {
        assert_eq!(spacetime_prefix("tests_tract_3y_count").unwrap(), "tests_tract_3y_");
    }

    #[test]
    fn test_parse_rejects_short_names() {
        for name in ["tests_tract_3y", "tests", "", "tests__3y_count", "tests_tract_3y_"] {
            assert!(matches!(PanelColumn::parse(name), Err(PanelError::Parse(_))), "{}", name);
        }
    }

    #[test]
    fn test_new_rejects_separator_in_fixed_fields() {
        assert!(PanelColumn::new("my_prefix", "tract", "3y", "count").is_err());
        assert!(PanelColumn::new("tests", "census_tract", "3y", "count").is_err());
    }
}

//! Grouped numerator/denominator aggregation

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::config::MetricDtype;
use super::frame::{column_series, is_numeric_dtype};
use crate::error::{PanelError, Result};

/// A function computing a column from the whole table
pub type ComputeFn = Arc<dyn Fn(&DataFrame) -> Result<Series> + Send + Sync>;

/// Source of a numerator, denominator or weight
#[derive(Clone, Deserialize)]
#[serde(from = "ExpressionRepr")]
pub enum Expression {
    /// Values of an existing column
    Column(String),
    /// Values computed from the table; must have one value per row
    Computed(ComputeFn),
    /// A scalar broadcast to every row
    Constant(f64),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpressionRepr {
    Column(String),
    Constant(f64),
}

impl From<ExpressionRepr> for Expression {
    fn from(repr: ExpressionRepr) -> Self {
        match repr {
            ExpressionRepr::Column(name) => Expression::Column(name),
            ExpressionRepr::Constant(value) => Expression::Constant(value),
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(name) => f.debug_tuple("Column").field(name).finish(),
            Expression::Computed(_) => f.write_str("Computed(<fn>)"),
            Expression::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
        }
    }
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&DataFrame) -> Result<Series> + Send + Sync + 'static,
    {
        Expression::Computed(Arc::new(f))
    }

    pub fn constant(value: f64) -> Self {
        Expression::Constant(value)
    }

    /// Evaluate against `df`, one value per row, keeping the source dtype.
    /// Boolean values count as 0/1.
    pub fn evaluate(&self, df: &DataFrame) -> Result<Series> {
        let series = match self {
            Expression::Column(name) => column_series(df, name)?.clone(),
            Expression::Computed(f) => {
                let series = f(df)?;
                if series.len() != df.height() {
                    return Err(PanelError::Schema(format!(
                        "Computed expression returned {} values for {} rows",
                        series.len(),
                        df.height()
                    )));
                }
                series
            }
            Expression::Constant(value) => Series::new(PlSmallStr::EMPTY, vec![*value; df.height()]),
        };
        numeric(series)
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Expression::Column(name.to_string())
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Constant(value)
    }
}

fn numeric(series: Series) -> Result<Series> {
    match series.dtype() {
        DataType::Null | DataType::Boolean => Ok(series.cast(&DataType::Int64)?),
        dtype if is_numeric_dtype(dtype) => Ok(series),
        dtype => Err(PanelError::Schema(format!(
            "Column '{}' has dtype {}, expected a numeric or boolean column",
            series.name(),
            dtype
        ))),
    }
}

/// Aggregation function applied to a metric component within each group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    #[default]
    Sum,
    Mean,
    /// Number of non-missing values
    Count,
    Min,
    Max,
    Median,
    /// Sample standard deviation
    Std,
    /// Sample variance
    Var,
    /// First non-missing value
    First,
    /// Last non-missing value
    Last,
    /// Number of distinct non-missing values
    NUnique,
    Prod,
}

impl AggFunc {
    /// Group-wise reduction of `expr`. Sum, Prod, Count and NUnique always
    /// yield a value; the others are missing when the group has no values.
    pub fn apply(self, expr: Expr) -> Expr {
        match self {
            AggFunc::Sum => expr.sum(),
            AggFunc::Mean => expr.mean(),
            AggFunc::Count => expr.count(),
            AggFunc::Min => expr.min(),
            AggFunc::Max => expr.max(),
            AggFunc::Median => expr.median(),
            AggFunc::Std => expr.std(1),
            AggFunc::Var => expr.var(1),
            AggFunc::First => expr.drop_nulls().first(),
            AggFunc::Last => expr.drop_nulls().last(),
            AggFunc::NUnique => expr.drop_nulls().n_unique(),
            AggFunc::Prod => expr.product(),
        }
    }
}

impl FromStr for AggFunc {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sum" => Ok(AggFunc::Sum),
            "mean" => Ok(AggFunc::Mean),
            "count" => Ok(AggFunc::Count),
            "min" => Ok(AggFunc::Min),
            "max" => Ok(AggFunc::Max),
            "median" => Ok(AggFunc::Median),
            "std" => Ok(AggFunc::Std),
            "var" => Ok(AggFunc::Var),
            "first" => Ok(AggFunc::First),
            "last" => Ok(AggFunc::Last),
            "nunique" => Ok(AggFunc::NUnique),
            "prod" => Ok(AggFunc::Prod),
            other => Err(PanelError::Parse(format!("Unknown aggregation function '{}'", other))),
        }
    }
}

/// One named output column of [`aggregate`].
///
/// Without a denominator the output is `func(numerator)`; with one it is
/// `func(numerator) / denominator_func(denominator)`, where
/// `denominator_func` defaults to `func`. The numerator defaults to a
/// column of ones, i.e. a row count.
#[derive(Debug, Clone, Deserialize)]
pub struct Metric {
    pub name: String,
    #[serde(default)]
    pub numerator: Option<Expression>,
    #[serde(default)]
    pub denominator: Option<Expression>,
    #[serde(default)]
    pub func: AggFunc,
    #[serde(default)]
    pub denominator_func: Option<AggFunc>,
    #[serde(default)]
    pub dtype: Option<MetricDtype>,
}

impl Metric {
    /// Number of rows in each group
    pub fn count(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            numerator: None,
            denominator: None,
            func: AggFunc::Sum,
            denominator_func: None,
            dtype: None,
        }
    }

    pub fn sum(name: impl Into<String>, numerator: impl Into<Expression>) -> Self {
        Self::count(name).with_numerator(numerator)
    }

    pub fn ratio(
        name: impl Into<String>,
        numerator: impl Into<Expression>,
        denominator: impl Into<Expression>,
    ) -> Self {
        Self::sum(name, numerator).with_denominator(denominator)
    }

    pub fn with_numerator(mut self, numerator: impl Into<Expression>) -> Self {
        self.numerator = Some(numerator.into());
        self
    }

    pub fn with_denominator(mut self, denominator: impl Into<Expression>) -> Self {
        self.denominator = Some(denominator.into());
        self
    }

    pub fn with_func(mut self, func: AggFunc) -> Self {
        self.func = func;
        self
    }

    pub fn with_denominator_func(mut self, func: AggFunc) -> Self {
        self.denominator_func = Some(func);
        self
    }

    pub fn with_dtype(mut self, dtype: MetricDtype) -> Self {
        self.dtype = Some(dtype);
        self
    }
}

/// Ordered set of metrics computed together
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Vec<Metric>")]
pub struct AggregateSpec {
    metrics: Vec<Metric>,
}

impl AggregateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a metric. Names must be unique; see [`AggregateSpec::validate`].
    pub fn with(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.metrics.iter().map(|m| m.name.as_str()).collect()
    }

    /// Declared output dtypes by metric name
    pub fn dtypes(&self) -> HashMap<String, MetricDtype> {
        self.metrics
            .iter()
            .filter_map(|m| m.dtype.map(|d| (m.name.clone(), d)))
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if metric.name.is_empty() {
                return Err(PanelError::Parse("Metric name must not be empty".to_string()));
            }
            if !seen.insert(metric.name.as_str()) {
                return Err(PanelError::Parse(format!("Duplicate metric '{}'", metric.name)));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<Vec<Metric>> for AggregateSpec {
    type Error = PanelError;

    fn try_from(metrics: Vec<Metric>) -> Result<Self> {
        let spec = Self { metrics };
        spec.validate()?;
        Ok(spec)
    }
}

const WEIGHT_COLUMN: &str = "__weight";

fn numerator_column(position: usize) -> String {
    format!("__numerator_{}", position)
}

fn denominator_column(position: usize) -> String {
    format!("__denominator_{}", position)
}

/// Compute every metric of `spec` per group of `index`.
///
/// `weight`, when given, multiplies numerators and denominators row by row
/// before aggregation. Without an `index` the whole table is one group.
/// Returns the index columns (one row per group, first-appearance order)
/// followed by one column per metric in declared order. Rows with a missing
/// index value are dropped. Reductions keep the source dtype; only ratios
/// are computed as `Float64`, and a zero or missing denominator yields a
/// missing value.
pub fn aggregate(
    df: &DataFrame,
    spec: &AggregateSpec,
    weight: Option<&Expression>,
    index: Option<&[String]>,
) -> Result<DataFrame> {
    spec.validate()?;
    let index = index.unwrap_or(&[]);
    for name in index {
        column_series(df, name)?;
    }

    // Numerators and denominators become columns of a working copy
    let mut work = df.clone();
    let mut components = Vec::new();
    for (position, metric) in spec.metrics().iter().enumerate() {
        let numerator = match &metric.numerator {
            Some(expr) => expr.evaluate(df)?,
            None => Series::new(PlSmallStr::EMPTY, vec![1i64; df.height()]),
        };
        let name = numerator_column(position);
        work.with_column(numerator.with_name(name.as_str().into()))?;
        components.push(name);

        if let Some(expr) = &metric.denominator {
            let name = denominator_column(position);
            work.with_column(expr.evaluate(df)?.with_name(name.as_str().into()))?;
            components.push(name);
        }
    }

    let mut lf = match weight {
        Some(weight) => {
            work.with_column(weight.evaluate(df)?.with_name(WEIGHT_COLUMN.into()))?;
            let weighted: Vec<Expr> = components
                .iter()
                .map(|name| (col(name.as_str()) * col(WEIGHT_COLUMN)).alias(name.as_str()))
                .collect();
            work.lazy().with_columns(weighted)
        }
        None => work.lazy(),
    };

    let mut reductions = Vec::new();
    for (position, metric) in spec.metrics().iter().enumerate() {
        let numerator = numerator_column(position);
        reductions.push(metric.func.apply(col(numerator.as_str())).alias(numerator.as_str()));
        if metric.denominator.is_some() {
            let denominator = denominator_column(position);
            let func = metric.denominator_func.unwrap_or(metric.func);
            reductions.push(func.apply(col(denominator.as_str())).alias(denominator.as_str()));
        }
    }

    let keys: Vec<Expr> = index.iter().map(|name| col(name.as_str())).collect();
    lf = match keys.iter().cloned().map(Expr::is_not_null).reduce(|a, b| a.and(b)) {
        Some(present) => lf.filter(present).group_by_stable(keys.clone()).agg(reductions),
        None => lf.select(reductions),
    };

    let mut outputs = keys;
    for (position, metric) in spec.metrics().iter().enumerate() {
        let numerator = col(numerator_column(position).as_str());
        let value = if metric.denominator.is_some() {
            let denominator = col(denominator_column(position).as_str()).cast(DataType::Float64);
            when(denominator.clone().eq(lit(0.0)))
                .then(lit(NULL).cast(DataType::Float64))
                .otherwise(numerator.cast(DataType::Float64) / denominator)
        } else {
            numerator
        };
        outputs.push(value.alias(metric.name.as_str()));
    }
    let mut result = lf.select(outputs).collect()?;

    for metric in spec.metrics() {
        let Some(dtype) = metric.dtype else {
            continue;
        };
        let cast = column_series(&result, &metric.name)?
            .strict_cast(&dtype.to_dtype())
            .map_err(|e| {
                PanelError::Schema(format!("Cannot cast metric '{}' to {:?}: {}", metric.name, dtype, e))
            })?;
        result.with_column(cast)?;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_f64(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        let values = df.column(name).unwrap().as_materialized_series().cast(&DataType::Float64).unwrap();
        values.f64().unwrap().into_iter().collect()
    }

    fn index(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_count_by_group() {
        let df = df!("g" => &["a", "a", "b"]).unwrap();
        let spec = AggregateSpec::new().with(Metric::count("n"));
        let idx = index(&["g"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        let groups: Vec<&str> = result.column("g").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(groups, vec!["a", "b"]);
        assert_eq!(as_f64(&result, "n"), vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_ratio_without_grouping() {
        let df = df!("x" => &[1.0, 3.0], "w" => &[2.0, 0.0]).unwrap();
        let spec = AggregateSpec::new().with(Metric::ratio("rate", "x", "w"));

        let result = aggregate(&df, &spec, None, None).unwrap();
        assert_eq!(result.height(), 1);
        assert_eq!(as_f64(&result, "rate"), vec![Some(2.0)]);
    }

    #[test]
    fn test_zero_denominator_is_missing() {
        let df = df!("x" => &[1.0, 3.0], "w" => &[0.0, 0.0]).unwrap();
        let spec = AggregateSpec::new().with(Metric::ratio("rate", "x", "w"));

        let result = aggregate(&df, &spec, None, None).unwrap();
        assert_eq!(as_f64(&result, "rate"), vec![None]);
    }

    #[test]
    fn test_weight_applies_before_aggregation() {
        let df = df!(
            "g" => &[1i64, 1, 2],
            "x" => &[1.0, 2.0, 4.0],
            "w" => &[2.0, 0.5, 3.0]
        )
        .unwrap();
        let spec = AggregateSpec::new()
            .with(Metric::sum("total", "x"))
            .with(Metric::count("n"));
        let idx = index(&["g"]);

        let weight = Expression::column("w");
        let result = aggregate(&df, &spec, Some(&weight), Some(&idx)).unwrap();
        assert_eq!(as_f64(&result, "total"), vec![Some(3.0), Some(12.0)]);
        assert_eq!(as_f64(&result, "n"), vec![Some(2.5), Some(3.0)]);
    }

    #[test]
    fn test_denominator_func_override() {
        let df = df!("g" => &["a", "a", "a"], "x" => &[2.0, 4.0, 6.0], "y" => &[1.0, 1.0, 1.0]).unwrap();
        let spec = AggregateSpec::new().with(
            Metric::ratio("mean_per_count", "x", "y")
                .with_func(AggFunc::Mean)
                .with_denominator_func(AggFunc::Count),
        );
        let idx = index(&["g"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        assert_eq!(as_f64(&result, "mean_per_count"), vec![Some(4.0 / 3.0)]);
    }

    #[test]
    fn test_constant_and_computed_expressions() {
        let df = df!("x" => &[1.0, 2.0, 3.0]).unwrap();
        let doubled = Expression::computed(|df: &DataFrame| {
            let x = df.column("x")?.as_materialized_series().clone();
            Ok(&x * 2.0)
        });
        let spec = AggregateSpec::new()
            .with(Metric::sum("const", 0.5))
            .with(Metric::sum("doubled", doubled));

        let result = aggregate(&df, &spec, None, None).unwrap();
        assert_eq!(as_f64(&result, "const"), vec![Some(1.5)]);
        assert_eq!(as_f64(&result, "doubled"), vec![Some(12.0)]);
    }

    #[test]
    fn test_missing_column_fails_fast() {
        let df = df!("x" => &[1.0]).unwrap();
        let spec = AggregateSpec::new().with(Metric::sum("total", "nope"));
        let err = aggregate(&df, &spec, None, None).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn(ref c) if c == "nope"));
    }

    #[test]
    fn test_missing_index_column() {
        let df = df!("x" => &[1.0]).unwrap();
        let spec = AggregateSpec::new().with(Metric::count("n"));
        let idx = index(&["tract"]);
        let err = aggregate(&df, &spec, None, Some(&idx)).unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn(_)));
    }

    #[test]
    fn test_composite_index_and_null_keys() {
        let df = df!(
            "state" => &[Some("IL"), Some("IL"), Some("WI"), None],
            "naics" => &[11i64, 11, 11, 11]
        )
        .unwrap();
        let spec = AggregateSpec::new().with(Metric::count("n").with_dtype(MetricDtype::Int64));
        let idx = index(&["state", "naics"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        assert_eq!(result.height(), 2);
        assert_eq!(result.width(), 3);
        let n: Vec<i64> = result.column("n").unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(n, vec![2, 1]);
    }

    #[test]
    fn test_preserves_metric_order() {
        let df = df!("x" => &[1.0]).unwrap();
        let spec = AggregateSpec::new()
            .with(Metric::sum("z", "x"))
            .with(Metric::count("a"))
            .with(Metric::sum("m", "x"));
        let result = aggregate(&df, &spec, None, None).unwrap();
        let names: Vec<String> = result.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_empty_table_grouped() {
        let df = df!("g" => Vec::<i64>::new(), "x" => Vec::<f64>::new()).unwrap();
        let spec = AggregateSpec::new().with(Metric::sum("total", "x"));
        let idx = index(&["g"]);
        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        assert_eq!(result.height(), 0);
        assert_eq!(result.width(), 2);
    }

    #[test]
    fn test_reducers() {
        let df = df!(
            "g" => &["a", "a", "a", "a", "a", "b"],
            "v" => &[Some(1.0), None, Some(3.0), Some(3.0), Some(5.0), None]
        )
        .unwrap();
        let funcs = [
            ("sum", AggFunc::Sum),
            ("mean", AggFunc::Mean),
            ("count", AggFunc::Count),
            ("min", AggFunc::Min),
            ("max", AggFunc::Max),
            ("median", AggFunc::Median),
            ("first", AggFunc::First),
            ("last", AggFunc::Last),
            ("nunique", AggFunc::NUnique),
            ("prod", AggFunc::Prod),
            ("var", AggFunc::Var),
            ("std", AggFunc::Std),
        ];
        let spec = funcs.iter().fold(AggregateSpec::new(), |spec, (name, func)| {
            spec.with(Metric::sum(*name, "v").with_func(*func))
        });
        let idx = index(&["g"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        let first = |name: &str| as_f64(&result, name)[0];
        assert_eq!(first("sum"), Some(12.0));
        assert_eq!(first("mean"), Some(3.0));
        assert_eq!(first("count"), Some(4.0));
        assert_eq!(first("min"), Some(1.0));
        assert_eq!(first("max"), Some(5.0));
        assert_eq!(first("median"), Some(3.0));
        assert_eq!(first("first"), Some(1.0));
        assert_eq!(first("last"), Some(5.0));
        assert_eq!(first("nunique"), Some(3.0));
        assert_eq!(first("prod"), Some(45.0));
        assert!((first("var").unwrap() - 8.0 / 3.0).abs() < 1e-12);

        // group "b" has only a missing value
        let second = |name: &str| as_f64(&result, name)[1];
        assert_eq!(second("sum"), Some(0.0));
        assert_eq!(second("count"), Some(0.0));
        assert_eq!(second("mean"), None);
        assert_eq!(second("std"), None);
    }

    #[test]
    fn test_composite_keys_with_separator_stay_distinct() {
        let df = df!("a" => &["x|y", "x"], "b" => &["z", "y|z"]).unwrap();
        let spec = AggregateSpec::new().with(Metric::count("n"));
        let idx = index(&["a", "b"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        assert_eq!(result.height(), 2);
        assert_eq!(as_f64(&result, "n"), vec![Some(1.0), Some(1.0)]);
    }

    #[test]
    fn test_integer_sum_is_exact() {
        let big = (1i64 << 53) + 1;
        let df = df!("x" => &[big]).unwrap();
        let spec = AggregateSpec::new().with(Metric::sum("s", "x").with_dtype(MetricDtype::Int64));

        let result = aggregate(&df, &spec, None, None).unwrap();
        assert_eq!(result.column("s").unwrap().i64().unwrap().get(0), Some(big));
    }

    #[test]
    fn test_reductions_keep_source_dtype() {
        let df = df!("g" => &[1i64, 1, 2], "x" => &[4i32, 6, 5], "y" => &[1i32, 2, 0]).unwrap();
        let spec = AggregateSpec::new()
            .with(Metric::count("n"))
            .with(Metric::sum("low", "x").with_func(AggFunc::Min))
            .with(Metric::ratio("rate", "x", "y"));
        let idx = index(&["g"]);

        let result = aggregate(&df, &spec, None, Some(&idx)).unwrap();
        assert_eq!(result.column("n").unwrap().dtype(), &DataType::Int64);
        assert_eq!(result.column("low").unwrap().dtype(), &DataType::Int32);
        assert_eq!(result.column("rate").unwrap().dtype(), &DataType::Float64);
        assert_eq!(as_f64(&result, "rate"), vec![Some(10.0 / 3.0), None]);
    }

    #[test]
    fn test_boolean_numerator_counts_true() {
        let df = df!("hit" => &[true, false, true]).unwrap();
        let spec = AggregateSpec::new().with(Metric::sum("hits", "hit"));
        let result = aggregate(&df, &spec, None, None).unwrap();
        assert_eq!(as_f64(&result, "hits"), vec![Some(2.0)]);
    }

    #[test]
    fn test_spec_from_json() {
        let spec = AggregateSpec::from_json_str(
            r#"[
                {"name": "count"},
                {"name": "kids", "numerator": "kid_count", "func": "sum"},
                {"name": "rate", "numerator": "positive", "denominator": 2.0, "dtype": "Float32"}
            ]"#,
        )
        .unwrap();
        assert_eq!(spec.metric_names(), vec!["count", "kids", "rate"]);
        assert!(matches!(spec.metrics()[1].numerator, Some(Expression::Column(ref c)) if c == "kid_count"));
        assert!(matches!(spec.metrics()[2].denominator, Some(Expression::Constant(v)) if v == 2.0));
        assert_eq!(spec.dtypes()["rate"], MetricDtype::Float32);
    }

    #[test]
    fn test_spec_rejects_duplicate_names() {
        let json = r#"[{"name": "n"}, {"name": "n"}]"#;
        assert!(AggregateSpec::from_json_str(json).is_err());
    }

    #[test]
    fn test_non_numeric_numerator() {
        let df = df!("s" => &["a", "b"]).unwrap();
        let spec = AggregateSpec::new().with(Metric::sum("total", "s"));
        assert!(matches!(aggregate(&df, &spec, None, None), Err(PanelError::Schema(_))));
    }
}

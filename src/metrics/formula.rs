//! Arithmetic over timeseries.
//!
//! A `Formula` is a recursive tree whose leaves are timeseries and numeric
//! constants. Nothing is evaluated here; the engine computes the result.

use std::fmt;

use crate::ast::condition::ConditionGroup;
use crate::ast::expr::{Expr, Scalar};

use super::timeseries::{
    check_aggregate_params, check_filters, check_function_name, check_groupby, Timeseries,
};
use super::{MetricsError, MetricsResult};

/// The four infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl ArithmeticOperator {
    /// The engine function name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOperator::Plus => "plus",
            ArithmeticOperator::Minus => "minus",
            ArithmeticOperator::Multiply => "multiply",
            ArithmeticOperator::Divide => "divide",
        }
    }

    /// The infix symbol used in MQL.
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOperator::Plus => "+",
            ArithmeticOperator::Minus => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "/",
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(ArithmeticOperator::Plus),
            '-' => Some(ArithmeticOperator::Minus),
            '*' => Some(ArithmeticOperator::Multiply),
            '/' => Some(ArithmeticOperator::Divide),
            _ => None,
        }
    }
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a formula applies to its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaFunction {
    Arithmetic(ArithmeticOperator),
    /// Any other engine function, e.g. `apdex` or `topK`.
    Named(String),
}

impl FormulaFunction {
    pub fn name(&self) -> &str {
        match self {
            FormulaFunction::Arithmetic(op) => op.as_str(),
            FormulaFunction::Named(name) => name,
        }
    }
}

impl From<ArithmeticOperator> for FormulaFunction {
    fn from(op: ArithmeticOperator) -> Self {
        FormulaFunction::Arithmetic(op)
    }
}

/// One operand of a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaParameter {
    Timeseries(Timeseries),
    Formula(Formula),
    Int(i64),
    Float(f64),
    /// Only named functions take strings, e.g. a tag name.
    String(String),
}

impl FormulaParameter {
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FormulaParameter::Int(_) | FormulaParameter::Float(_) | FormulaParameter::String(_)
        )
    }

    pub fn check(&self) -> MetricsResult<()> {
        match self {
            FormulaParameter::Timeseries(ts) => ts.check(),
            FormulaParameter::Formula(f) => f.check(),
            FormulaParameter::Int(_) | FormulaParameter::String(_) => Ok(()),
            FormulaParameter::Float(f) if f.is_finite() => Ok(()),
            FormulaParameter::Float(f) => Err(MetricsError::InvalidFormula(format!(
                "parameter {f} is not a finite number"
            ))),
        }
    }

    /// The entities of every timeseries under this parameter.
    fn collect_entities<'a>(&'a self, found: &mut Vec<&'a str>) {
        match self {
            FormulaParameter::Timeseries(ts) => found.extend(ts.metric.entity.as_deref()),
            FormulaParameter::Formula(f) => {
                f.parameters.iter().for_each(|p| p.collect_entities(found))
            }
            FormulaParameter::Int(_) | FormulaParameter::Float(_) | FormulaParameter::String(_) => {}
        }
    }
}

impl From<Timeseries> for FormulaParameter {
    fn from(ts: Timeseries) -> Self {
        FormulaParameter::Timeseries(ts)
    }
}

impl From<Formula> for FormulaParameter {
    fn from(f: Formula) -> Self {
        FormulaParameter::Formula(f)
    }
}

impl From<i64> for FormulaParameter {
    fn from(n: i64) -> Self {
        FormulaParameter::Int(n)
    }
}

impl From<f64> for FormulaParameter {
    fn from(f: f64) -> Self {
        FormulaParameter::Float(f)
    }
}

impl From<&str> for FormulaParameter {
    fn from(s: &str) -> Self {
        FormulaParameter::String(s.to_string())
    }
}

/// `function(parameters){filters} by (groupby)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub function: FormulaFunction,
    pub aggregate_params: Vec<Scalar>,
    pub parameters: Vec<FormulaParameter>,
    pub filters: Vec<ConditionGroup>,
    pub groupby: Vec<Expr>,
}

impl Formula {
    pub fn new(
        function: impl Into<FormulaFunction>,
        parameters: Vec<FormulaParameter>,
    ) -> MetricsResult<Self> {
        let formula = Self {
            function: function.into(),
            aggregate_params: Vec::new(),
            parameters,
            filters: Vec::new(),
            groupby: Vec::new(),
        };
        formula.check_shape()?;
        Ok(formula)
    }

    pub fn arithmetic(
        op: ArithmeticOperator,
        lhs: impl Into<FormulaParameter>,
        rhs: impl Into<FormulaParameter>,
    ) -> MetricsResult<Self> {
        Self::new(op, vec![lhs.into(), rhs.into()])
    }

    pub fn named(name: &str, parameters: Vec<FormulaParameter>) -> MetricsResult<Self> {
        check_function_name(name)?;
        Self::new(FormulaFunction::Named(name.to_string()), parameters)
    }

    pub fn with_aggregate_params(self, aggregate_params: Vec<Scalar>) -> MetricsResult<Self> {
        check_aggregate_params(&aggregate_params)
            .map_err(|e| MetricsError::InvalidFormula(e.to_string()))?;
        Ok(Self {
            aggregate_params,
            ..self
        })
    }

    pub fn set_parameters(&self, parameters: Vec<FormulaParameter>) -> MetricsResult<Formula> {
        let formula = Self {
            parameters,
            ..self.clone()
        };
        formula.check_shape()?;
        Ok(formula)
    }

    pub fn set_filters(&self, filters: Vec<ConditionGroup>) -> MetricsResult<Formula> {
        check_filters(&filters)?;
        Ok(Self {
            filters,
            ..self.clone()
        })
    }

    pub fn set_groupby(&self, groupby: Vec<Expr>) -> MetricsResult<Formula> {
        check_groupby(&groupby)?;
        Ok(Self {
            groupby,
            ..self.clone()
        })
    }

    /// The cheap local rules checked at construction.
    fn check_shape(&self) -> MetricsResult<()> {
        if self.parameters.is_empty() {
            return Err(MetricsError::InvalidFormula(format!(
                "{} needs at least one parameter",
                self.function.name()
            )));
        }
        if self.parameters.iter().all(FormulaParameter::is_scalar) {
            return Err(MetricsError::InvalidFormula(format!(
                "{} needs at least one timeseries or formula parameter",
                self.function.name()
            )));
        }
        if let FormulaFunction::Arithmetic(op) = &self.function {
            if self
                .parameters
                .iter()
                .any(|p| matches!(p, FormulaParameter::String(_)))
            {
                return Err(MetricsError::InvalidFormula(format!(
                    "{op} only takes numbers, timeseries and formulas"
                )));
            }
        }
        Ok(())
    }

    /// Every rule, recursively.
    pub fn check(&self) -> MetricsResult<()> {
        if let FormulaFunction::Named(name) = &self.function {
            check_function_name(name)?;
        }
        self.check_shape()?;
        check_aggregate_params(&self.aggregate_params)?;
        for param in &self.parameters {
            param.check()?;
        }
        check_filters(&self.filters)?;
        check_groupby(&self.groupby)?;

        let mut entities = Vec::new();
        self.parameters
            .iter()
            .for_each(|p| p.collect_entities(&mut entities));
        entities.sort_unstable();
        entities.dedup();
        if entities.len() > 1 {
            return Err(MetricsError::InvalidFormula(format!(
                "formulas can only operate on a single entity, found {}",
                entities.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::timeseries::Metric;

    fn ts(name: &str) -> Timeseries {
        Timeseries::new(Metric::from_public_name(name), "sum").unwrap()
    }

    #[test]
    fn test_needs_a_non_scalar_parameter() {
        let err = Formula::arithmetic(ArithmeticOperator::Plus, 1i64, 2i64).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid formula: plus needs at least one timeseries or formula parameter"
        );
        assert!(Formula::arithmetic(ArithmeticOperator::Divide, ts("foo"), 1000i64).is_ok());
        assert!(Formula::new(ArithmeticOperator::Plus, vec![]).is_err());
    }

    #[test]
    fn test_nested_formula_counts_as_non_scalar() {
        let inner = Formula::arithmetic(ArithmeticOperator::Plus, ts("a"), ts("b")).unwrap();
        let outer = Formula::arithmetic(ArithmeticOperator::Multiply, inner, 2.5).unwrap();
        assert!(outer.check().is_ok());
    }

    #[test]
    fn test_named_function() {
        let apdex = Formula::named("apdex", vec![ts("foo").into(), FormulaParameter::Int(300)]).unwrap();
        assert_eq!(apdex.function.name(), "apdex");
        assert!(Formula::named("bad name!", vec![ts("foo").into()]).is_err());
    }

    #[test]
    fn test_string_parameters_only_in_named_functions() {
        let tagged = Formula::named("topK", vec![ts("foo").into(), "transaction".into()]).unwrap();
        assert!(tagged.check().is_ok());

        let err = Formula::arithmetic(ArithmeticOperator::Plus, ts("foo"), "1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid formula: plus only takes numbers, timeseries and formulas"
        );
        assert!(Formula::named("topK", vec!["transaction".into()]).is_err());
    }

    #[test]
    fn test_single_entity() {
        let a = ts("a")
            .set_metric(Metric::from_public_name("a").with_entity("generic_metrics_distributions"))
            .unwrap();
        let b = ts("b")
            .set_metric(Metric::from_public_name("b").with_entity("generic_metrics_sets"))
            .unwrap();
        let formula = Formula::arithmetic(ArithmeticOperator::Divide, a, b).unwrap();
        assert!(formula.check().is_err());
    }

    #[test]
    fn test_check_reaches_nested_timeseries() {
        let bare = Timeseries::bare(Metric::from_public_name("foo"));
        let formula = Formula::arithmetic(ArithmeticOperator::Plus, bare, 1i64).unwrap();
        assert!(formula.check().is_err());
    }

    #[test]
    fn test_operator_symbols() {
        for op in [
            ArithmeticOperator::Plus,
            ArithmeticOperator::Minus,
            ArithmeticOperator::Multiply,
            ArithmeticOperator::Divide,
        ] {
            let symbol = op.symbol().chars().next().unwrap();
            assert_eq!(ArithmeticOperator::from_symbol(symbol), Some(op));
        }
    }
}

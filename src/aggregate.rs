//! Cell aggregation.
//!
//! An aggregate combines a new value and weight with the running value and
//! running weight of a cell. The running value starts at integer zero and
//! the running weight at zero.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::TableError;
use crate::types::Value;

/// User-supplied reducer: `(new, running, new_weight, running_weight)`.
pub type AggregateFn = Arc<dyn Fn(&Value, &Value, f64, f64) -> Value + Send + Sync>;

/// How repeated updates of one cell combine.
#[derive(Clone, Default)]
pub enum Aggregate {
    /// Last write wins.
    #[default]
    None,
    /// Weighted running mean.
    Mean,
    /// Running total. Weights are ignored.
    Sum,
    /// Weights are ignored.
    Max,
    /// Weights are ignored. The zero seed takes part in the comparison.
    Min,
    Custom(AggregateFn),
}

impl Aggregate {
    pub fn custom(f: impl Fn(&Value, &Value, f64, f64) -> Value + Send + Sync + 'static) -> Self {
        Aggregate::Custom(Arc::new(f))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::None => "none",
            Aggregate::Mean => "mean",
            Aggregate::Sum => "sum",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
            Aggregate::Custom(_) => "custom",
        }
    }

    /// Whether this aggregate needs numeric inputs.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Aggregate::Mean | Aggregate::Sum | Aggregate::Max | Aggregate::Min
        )
    }

    /// Combine `new` into `running`. Returns `None` when a numeric aggregate
    /// meets a non-numeric value.
    pub fn apply(&self, new: &Value, running: &Value, weight: f64, running_weight: f64) -> Option<Value> {
        match self {
            Aggregate::None => Some(new.clone()),
            Aggregate::Custom(f) => Some(f(new, running, weight, running_weight)),
            Aggregate::Mean => {
                let (n, r) = (new.as_f64()?, running.as_f64()?);
                let total = running_weight + weight;
                if total == 0.0 {
                    return Some(Value::Float(n));
                }
                Some(Value::Float((r * running_weight + n * weight) / total))
            }
            Aggregate::Sum => match (new, running) {
                (Value::Int(n), Value::Int(r)) => Some(
                    n.checked_add(*r)
                        .map_or(Value::Float(*n as f64 + *r as f64), Value::Int),
                ),
                _ => Some(Value::Float(new.as_f64()? + running.as_f64()?)),
            },
            Aggregate::Max | Aggregate::Min => {
                let (n, r) = (new.as_f64()?, running.as_f64()?);
                let take_new = if matches!(self, Aggregate::Max) { n > r } else { n < r };
                Some(if take_new { new.clone() } else { running.clone() })
            }
        }
    }
}

impl fmt::Debug for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Aggregate {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Aggregate::None),
            "mean" => Ok(Aggregate::Mean),
            "sum" => Ok(Aggregate::Sum),
            "max" => Ok(Aggregate::Max),
            "min" => Ok(Aggregate::Min),
            _ => Err(TableError::UnknownAggregate { name: s.to_string() }),
        }
    }
}

impl TryFrom<&str> for Aggregate {
    type Error = TableError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(aggregate: &Aggregate, values: &[Value]) -> Value {
        let mut running = Value::Int(0);
        let mut running_weight = 0.0;
        for v in values {
            running = aggregate.apply(v, &running, 1.0, running_weight).unwrap();
            running_weight += 1.0;
        }
        running
    }

    fn ints(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    #[test]
    fn mean_of_zero_to_nine() {
        assert_eq!(fold(&Aggregate::Mean, &ints(0..10)), Value::Float(4.5));
    }

    #[test]
    fn sum_of_integers_stays_integer() {
        assert_eq!(fold(&Aggregate::Sum, &ints(0..10)), Value::Int(45));
    }

    #[test]
    fn min_and_max_include_zero_seed() {
        assert_eq!(fold(&Aggregate::Min, &ints(0..10)), Value::Int(0));
        assert_eq!(fold(&Aggregate::Max, &ints(0..10)), Value::Int(9));
        assert_eq!(fold(&Aggregate::Min, &ints(3..6)), Value::Int(0));
    }

    #[test]
    fn weighted_mean() {
        let v = Aggregate::Mean.apply(&Value::Int(5), &Value::Int(10), 1.0, 1.0);
        assert_eq!(v, Some(Value::Float(7.5)));
    }

    #[test]
    fn sum_ignores_weight() {
        let v = Aggregate::Sum.apply(&Value::Int(5), &Value::Int(10), 3.0, 2.0);
        assert_eq!(v, Some(Value::Int(15)));
    }

    #[test]
    fn none_keeps_latest() {
        let v = Aggregate::None.apply(&Value::from("b"), &Value::from("a"), 1.0, 1.0);
        assert_eq!(v, Some(Value::from("b")));
    }

    #[test]
    fn numeric_aggregate_rejects_text() {
        assert_eq!(Aggregate::Sum.apply(&Value::from("x"), &Value::Int(0), 1.0, 0.0), None);
    }

    #[test]
    fn custom_aggregate_receives_all_four_arguments() {
        let last_weight = Aggregate::custom(|_, _, w, rw| Value::Float(w + rw));
        assert_eq!(
            last_weight.apply(&Value::Int(1), &Value::Int(0), 2.0, 3.0),
            Some(Value::Float(5.0))
        );
    }

    #[test]
    fn parses_names() {
        assert_eq!("MEAN".parse::<Aggregate>().unwrap().name(), "mean");
        assert!(matches!(
            "median".parse::<Aggregate>(),
            Err(TableError::UnknownAggregate { .. })
        ));
    }
}

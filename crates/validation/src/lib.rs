pub mod comparator;
pub mod harness;
pub mod regression;

pub use comparator::{ComparatorResult, TickerSeries, VectorizedComparator};
pub use harness::{ConsistencyInputs, ValidationHarness, ValidationReport};
pub use regression::{ReferenceOutcome, RegressionCheck, RegressionError, RegressionStore};

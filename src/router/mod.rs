//! Request analysis and provider selection.

pub mod complexity;
pub mod constraints;
pub mod cost;
pub mod performance;
pub mod scoring;
pub mod selector;

pub use complexity::{ComplexityAnalyzer, ComplexityHint, ComplexityLevel, ComplexityScore, Domain};
pub use constraints::{Constraints, Priority, RequestContext};
pub use cost::{CostBreakdown, CostEstimator, RateTableEstimator};
pub use performance::{PerformanceTracker, ProviderPerformance};
pub use scoring::{ScoreBreakdown, Weights};
pub use selector::{ScoredProvider, Selector};

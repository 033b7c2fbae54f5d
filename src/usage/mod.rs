pub mod tracker;

pub use tracker::{UsageBreakdown, UsageMetrics, UsageSession, UsageSummary, UsageTracker};

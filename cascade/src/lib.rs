pub mod detector;
pub mod types;
pub mod window;

pub use detector::CascadeDetector;
pub use types::{
    CascadeSignal, DetectorConfig, LiquidationEvent, LiquidationMetrics, ProbabilityWeights,
    Side, Timeframe,
};

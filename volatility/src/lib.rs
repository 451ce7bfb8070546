pub mod buffer;
pub mod engine;
pub mod stats;
pub mod types;

pub use engine::VolatilityEngine;
pub use types::{
    PricePoint, RegimeChange, SignalAdjustment, TimeframeBucket, VolatilityMetrics,
    VolatilityRegime,
};

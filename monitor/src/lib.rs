pub mod funnel;

pub use funnel::{FeedEvent, MarketMonitor, MonitorSnapshot};

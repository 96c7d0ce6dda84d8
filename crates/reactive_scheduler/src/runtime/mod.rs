pub mod real_time;
pub mod virtual_time;

pub use real_time::{RealTimeConfig, RealTimeScheduler};
pub use virtual_time::{HistoricalScheduler, NextItem, VirtualTimeScheduler};

pub mod arbiter;
pub mod classifier;
pub mod config;
pub mod fleet;
pub mod monitor;
pub mod platform;
pub mod protocol;
pub mod schedule;
pub mod stats;
pub mod watchlist;

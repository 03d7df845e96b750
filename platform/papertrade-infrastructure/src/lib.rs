pub mod market_data;
pub mod persistence;
pub mod reporting;
pub mod sentiment;

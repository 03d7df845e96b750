pub mod market_data;
pub mod runs;
pub mod sentiment;
pub mod technical;

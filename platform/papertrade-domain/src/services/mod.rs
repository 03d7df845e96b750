pub mod audit;
pub mod context;
pub mod engine;
pub mod market_data_source;
pub mod ohlcv;
pub mod sentiment;
pub mod sizer;
pub mod synthesizer;
pub mod technical;

pub mod action;
pub mod bar;
pub mod context;
pub mod equity_point;
pub mod position;
pub mod sentiment;
pub mod signal;
pub mod technical;
pub mod timeframe;
pub mod trade;

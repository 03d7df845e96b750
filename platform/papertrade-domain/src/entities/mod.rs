pub mod agent;
pub mod metrics;
pub mod portfolio;
pub mod run;
pub mod sizing;

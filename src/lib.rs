pub mod alerts;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod eval_stats;
pub mod evaluator;
pub mod explorer;
pub mod models;
pub mod rate_limit;
pub mod scheduler;
pub mod storage;
pub mod window;

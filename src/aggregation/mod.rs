pub mod commands;
pub mod service;
pub mod summary;

pub use service::SessionAggregationService;
pub use summary::summarize;

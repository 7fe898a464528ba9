pub mod config;
pub mod service;

pub use config::TrackerConfig;
pub use service::TrackerService;

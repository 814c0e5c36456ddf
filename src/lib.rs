pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod providers;
pub mod storage;
pub mod types;
pub mod worker;

pub use config::Config;
pub use error::PlanError;
pub use types::*;

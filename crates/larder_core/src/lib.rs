pub mod delivered;
pub mod error;
pub mod eviction;
pub mod inventory;
pub mod notifications;
pub mod planner;
pub mod policy;
pub mod service;
pub mod store;

pub use crate::error::NotifyError;
pub use crate::service::{CycleReport, ExpiryConfig, ExpiryService, ExpiryServiceBuilder};

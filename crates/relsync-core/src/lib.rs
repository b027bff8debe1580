pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod reconcile;
pub mod store;
pub mod sync;
pub mod types;
pub mod validation;
pub mod version;

pub use error::{Result, RelsyncError};

pub mod config;
pub mod engine;
pub mod error;
pub mod repository;
pub mod transaction;

pub use engine::Engine;
pub use error::{ConfigurationError, ErrorKind};
pub use transaction::{TransactionCoordinator, TransactionHandle};

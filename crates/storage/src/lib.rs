pub mod driver;
pub mod error;
mod models;
mod store;

pub use crate::driver::StorageDriver;
pub use crate::models::{Attributes, PAYLOAD_VERSION, Payload, SearchHit, StoreRecord};
pub use crate::store::{Store, search};
use std::sync::Arc;

pub type DriverHandle = Arc<dyn StorageDriver + Send + Sync>;

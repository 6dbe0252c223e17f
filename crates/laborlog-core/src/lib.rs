pub mod apportion;
pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod model;
pub mod report;
pub mod storage;
pub mod tracker;

pub use error::{LaborlogError, Result};

pub mod config;
pub mod envelope;
pub mod error;
pub mod job;
pub mod mode;
pub mod ratelimit;
pub mod trace;

pub use error::{Error, Result};

pub mod app;
pub mod cli;
pub mod clock;
pub mod error;
pub mod jobs;
pub mod limits;
pub mod platform;
pub mod providers;
pub mod routing;
pub mod telemetry;
pub mod tools;
pub mod usage;
pub mod vendors;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

pub mod config;
pub mod error;
pub mod protocol;
pub mod token;
pub mod types;

pub use error::{Result, WorldError};

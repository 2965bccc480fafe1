pub mod analysis;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;

pub use error::{HiveError, Result};

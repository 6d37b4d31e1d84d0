pub mod builtin_roles;
pub mod client;
pub mod error;
pub mod policies;
pub mod roles;
pub mod users;

pub use client::{Client, ClientConfig, RetryConfig};
pub use error::ApiError;

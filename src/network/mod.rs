mod error;

pub mod client;
pub mod http_admin;
pub mod metrics;

pub use client::AdminClient;
pub use error::NetworkError;
pub use http_admin::{run_http_admin, AccessPolicy};

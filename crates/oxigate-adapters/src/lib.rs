//! Provider adapter layer for Oxigate.
//!
//! # Architecture
//!
//! - [`traits::ProviderAdapter`] — trait every provider adapter implements
//! - [`http::HttpAdapter`] — generic OpenAI-compatible HTTP client, one
//!   instance per configured provider
//! - [`fallback::FallbackAdapter`] — always-available canned responder
//! - [`error::AdapterError`] — the shared failure taxonomy

pub mod error;
pub mod fallback;
pub mod http;
pub mod traits;

pub use error::AdapterError;
pub use fallback::FallbackAdapter;
pub use http::HttpAdapter;
pub use traits::{AdapterOutput, ProviderAdapter};

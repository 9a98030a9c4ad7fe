//! HTTP implementation of [`StorageBackend`](psyhub_upload::StorageBackend).
//!
//! Talks to the backend's three chunk endpoints:
//!
//! - `GET  {check}`  with `identifier` and `chunkNumber` query parameters
//! - `POST {upload}` multipart form: metadata fields plus a `file` part
//! - `POST {merge}`  JSON body, answers with the asset URL
//!
//! Every response is a `{code, msg, data}` envelope.

pub mod client;
pub mod config;
pub mod error;

pub use client::HttpStorageBackend;
pub use config::ClientConfig;
pub use error::ClientError;

//! # Stor Client
//!
//! Client for an HTTP object store that exposes a directory model
//! (objects live under `/<account>/<top>/...` and directories are
//! first-class entries).
//!
//! The upload tooling only needs three capabilities from the store, so
//! they are captured by the [`StoreClient`] trait:
//!
//! - **probe**: what currently lives at a path
//! - **put**: stream bytes to a path
//! - **close**: release the client
//!
//! [`HttpStoreClient`] is the shipped implementation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use stor_client::{Config, HttpStoreClient, StoreClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HttpStoreClient::new(Config::new("http://localhost:8080"))?;
//!
//!     let probe = client.probe("/user/stor/reports").await?;
//!     println!("{:?}", probe);
//!
//!     client.close();
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod types;

pub use client::{HttpStoreClient, StoreClient};
pub use config::Config;
pub use error::{ClientError, ErrorKind, Result};
pub use types::*;

#![deny(clippy::unwrap_used)]

#[macro_use]
extern crate log;

pub mod client;
pub mod error;
pub mod http_client;

pub use client::{CreatedDid, DecryptRequest, DecryptResponse, DidDocument, EncryptRequest, EncryptResponse, KmsClient};
pub use error::KmsError;
pub use http_client::HttpKmsClient;

#[cfg(test)]
fn test_init() {
    env_logger::builder().is_test(true).try_init().ok();
}

//! Local content fingerprinting and the HTTP transport shared by remote clients.

mod fingerprint;
mod http;

pub use fingerprint::{fingerprint_bytes, fingerprint_file, CHUNK_SIZE};
pub use http::{FetchError, HttpClientConfig, HttpFetcher};

pub const CRATE_NAME: &str = "stashtag-io";

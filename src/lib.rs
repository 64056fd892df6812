//! A WebSocket throughput measurement library.
//!
//! Runs [ndt7](https://github.com/m-lab/ndt-server/blob/master/spec/ndt7-protocol.md)-style
//! speed tests: discover a measurement server, stream download traffic for a
//! fixed window, stream upload traffic for another, and report both rates in
//! Mbit/s. Designed for unattended use: a cycle never panics or errors out,
//! it degrades to a zero rate for whatever could not be measured. An optional
//! HTTP forward proxy covers both discovery and the measurement streams.
//!
//! # Quick start
//!
//! ```no_run
//! use speedprobe::client::ClientBuilder;
//! use speedprobe::emitter::HumanReadableEmitter;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new("my-app", "0.1.0").build()?;
//! let mut emitter = HumanReadableEmitter::new(std::io::stdout());
//!
//! let result = client.run_cycle(&mut emitter).await;
//! println!(
//!     "down {:.1} Mbit/s, up {:.1} Mbit/s",
//!     result.download_mbps, result.upload_mbps
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod download;
pub mod emitter;
pub mod error;
pub mod locate;
pub mod measurement;
pub mod params;
pub mod proxy;
pub mod session;
pub mod upload;

#[cfg(test)]
mod testutil;

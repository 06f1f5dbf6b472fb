//! Async ping sweep for IPv4 ranges.
//!
//! Expands a range in prefix notation into its usable host addresses, probes
//! every host concurrently under a configurable in-flight ceiling, and reports
//! which hosts never answered. Hosts that fail to respond are data, not
//! errors: a scan only fails on invalid input, cancellation, or a broken
//! aggregation invariant.
//!
//! ## Example
//! ```no_run
//! use async_sweep::{AddressRange, PingProber, ScanConfigBuilder, Scanner};
//!
//! tokio_test::block_on(async {
//!     let range: AddressRange = "192.168.1.0/24".parse().unwrap();
//!     let scanner = Scanner::new(PingProber::new(), ScanConfigBuilder::new().build());
//!     let result = scanner.scan(&range).await.unwrap();
//!     println!(
//!         "{} of {} hosts unreachable",
//!         result.unreachable.len(),
//!         result.total
//!     );
//! })
//! ```
//! Alternative probing backends (raw ICMP sockets, test fakes) plug in through
//! the [`probe::Prober`] trait; the scanner never needs to know how a probe is
//! carried out.

pub mod error;
pub mod probe;
pub mod range;
pub mod scanner;

pub use error::{Error, Result};
pub use probe::{PingProber, ProbeOutcome, ProbeStatus, Prober};
pub use range::{AddressRange, InvalidRangeError};
pub use scanner::{ScanConfig, ScanConfigBuilder, ScanResult, Scanner};

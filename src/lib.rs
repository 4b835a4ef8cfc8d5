//! Active detector for HTTP request-smuggling desyncs.
//!
//! This crate is the core only: a byte-faithful HTTP/1.1 transport, an
//! HTTP/2 transport with integrity checks disabled, and the baseline/probe/
//! confirm detection engine that drives both. The CLI dispatcher, web UI,
//! result persistence, and URL parsing are external collaborators that
//! construct a [`Target`] and [`ScanOptions`] and call [`scan`].
//!
//! ```no_run
//! # async fn run() -> Result<(), desync_core::DesyncError> {
//! use desync::{scan, Class, MutationCatalogue, ScanOptions, Target};
//!
//! let target = Target::new("example.com", 443, true);
//! let catalogue = MutationCatalogue::default();
//! let report = scan(&target, &Class::ALL, &catalogue, &ScanOptions::default()).await?;
//! for finding in &report.findings {
//!     println!("{}: {}", finding.class, finding.reason);
//! }
//! # Ok(())
//! # }
//! ```

pub use desync_core::{
    Class, ConfirmResult, DesyncError, Finding, HeaderPair, Mutation, MutationCatalogue, Placement,
    ProbeResult, ScanOptions, Target, TransportError,
};
pub use desync_engine::{scan, Baseline, ScanReport, Verdict};
pub use desync_transport::{Http1Transport, Http2Transport, ResponseInfo};

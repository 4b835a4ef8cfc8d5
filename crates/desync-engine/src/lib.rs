//! The desync detection engine: baseline/probe/confirm timing protocol
//! (spec §4.5) and per-class framing recipes, driven by [`scan`] over the
//! transports in `desync-transport`.

mod baseline;
mod classify;
mod cl_te;
mod common;
mod h2_cl;
mod h2_common;
mod h2_te;
mod scan;
mod te_cl;

pub use baseline::Baseline;
pub use classify::{classify, Verdict};
pub use scan::{scan, ScanReport};

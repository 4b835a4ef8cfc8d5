pub mod catalogue;
pub mod error;
pub mod model;

pub use catalogue::MutationCatalogue;
pub use error::{DesyncError, TransportError};
pub use model::{
    Class, ConfirmResult, Finding, HeaderPair, Mutation, Placement, ProbeResult, ScanOptions,
    Target,
};

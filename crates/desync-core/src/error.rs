use thiserror::Error;

/// Errors surfaced by the HTTP/1.1 and HTTP/2 transports.
///
/// `Timeout` is deliberately unremarkable here: per the detection protocol a
/// stalled read is the primary smuggling signal, not a defect.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("read timed out")]
    Timeout,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("http/2 protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Top-level error type for the core. Only `Config` aborts a scan before it
/// starts; everything else is recorded per-probe and the scan continues.
#[derive(Debug, Error)]
pub enum DesyncError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

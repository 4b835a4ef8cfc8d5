use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An immutable scan target: host, port, TLS flag, and request path.
///
/// `path` carries any query string and defaults to `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub path: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
            path: "/".to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// An ordered header pair carried as opaque bytes end-to-end. Both fields may
/// legally contain bytes that are illegal per RFC 7230 (CR, LF, colons in
/// names, surrounding whitespace) — that is the point of this detector.
/// Conversions to/from `String` only happen at display boundaries.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderPair {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Debug for HeaderPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderPair")
            .field("name", &String::from_utf8_lossy(&self.name))
            .field("value", &String::from_utf8_lossy(&self.value))
            .finish()
    }
}

impl fmt::Display for HeaderPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// Where, within an HTTP/2 header list, a mutation's CRLF-bearing bytes are
/// injected. HTTP/1 classes ignore this entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    NormalHeader,
    CustomHeaderValue,
    CustomHeaderName,
    RequestLine,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NormalHeader => "normal_header",
            Self::CustomHeaderValue => "custom_header_value",
            Self::CustomHeaderName => "custom_header_name",
            Self::RequestLine => "request_line",
        };
        f.write_str(s)
    }
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal_header" => Ok(Self::NormalHeader),
            "custom_header_value" => Ok(Self::CustomHeaderValue),
            "custom_header_name" => Ok(Self::CustomHeaderName),
            "request_line" => Ok(Self::RequestLine),
            other => Err(format!("unknown placement: {other}")),
        }
    }
}

/// One entry in the mutation catalogue: a header variant used as a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub description: String,
    pub header_name: Vec<u8>,
    pub header_value: Vec<u8>,
    pub placement: Placement,
    pub extra_headers: Vec<HeaderPair>,
}

impl Mutation {
    pub fn new(
        description: impl Into<String>,
        header_name: impl Into<Vec<u8>>,
        header_value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            description: description.into(),
            header_name: header_name.into(),
            header_value: header_value.into(),
            placement: Placement::NormalHeader,
            extra_headers: Vec::new(),
        }
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_extra_headers(mut self, extra: Vec<HeaderPair>) -> Self {
        self.extra_headers = extra;
        self
    }

    pub fn header(&self) -> HeaderPair {
        HeaderPair::new(self.header_name.clone(), self.header_value.clone())
    }
}

/// One of the four canonical desync classes. A tagged variant plus a
/// dispatch function, instead of a string-keyed lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Class {
    ClTe,
    TeCl,
    H2Te,
    H2Cl,
}

impl Class {
    pub const ALL: [Class; 4] = [Class::ClTe, Class::TeCl, Class::H2Te, Class::H2Cl];

    /// Whether this class speaks HTTP/2 on the wire.
    pub fn is_http2(self) -> bool {
        matches!(self, Class::H2Te | Class::H2Cl)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Class::ClTe => "cl.te",
            Class::TeCl => "te.cl",
            Class::H2Te => "h2.te",
            Class::H2Cl => "h2.cl",
        };
        f.write_str(s)
    }
}

impl FromStr for Class {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cl.te" => Ok(Class::ClTe),
            "te.cl" => Ok(Class::TeCl),
            "h2.te" => Ok(Class::H2Te),
            "h2.cl" => Ok(Class::H2Cl),
            other => Err(format!("unknown class: {other}")),
        }
    }
}

/// The outcome of a single confirmation request — a well-framed re-send of a
/// probe that met the suspicion criterion.
#[derive(Debug, Clone)]
pub struct ConfirmResult {
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub timed_out: bool,
    pub error: Option<String>,
    pub raw_request_bytes: Vec<u8>,
}

/// The outcome of a single probe attempt.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub mutation: Mutation,
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub timed_out: bool,
    pub error: Option<String>,
    pub raw_request_bytes: Vec<u8>,
    pub confirm: Option<ConfirmResult>,
}

/// A confirmed (or strongly suspected, for the H2 classes) desync finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub class: Class,
    pub mutation_description: String,
    pub header_name: Vec<u8>,
    pub header_value: Vec<u8>,
    pub placement: Option<Placement>,
    pub response_time: Duration,
    pub baseline_time: Duration,
    pub ratio: f64,
    pub reason: String,
    pub raw_request: Vec<u8>,
    pub confirm_raw_request: Option<Vec<u8>>,
}

/// Engine-facing scan configuration.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub timeout: Duration,
    pub exit_first: bool,
    pub custom_headers: Vec<HeaderPair>,
    pub h2_payload_placement: Option<Placement>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(5.0),
            exit_first: false,
            custom_headers: Vec::new(),
            h2_payload_placement: None,
        }
    }
}

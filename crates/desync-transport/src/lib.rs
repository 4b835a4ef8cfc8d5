//! Byte-faithful transports the detection engine drives directly: a
//! minimally-validating HTTP/1.1 client and an integrity-checks-disabled
//! HTTP/2 client, both over TLS configured by [`tls`].

pub mod http1;
pub mod http2;
pub mod tls;

pub use http1::{Conn, Http1Transport, ResponseInfo};
pub use http2::{H2Response, Http2Transport};

//! HTTP/2 transport with integrity checks deliberately disabled (spec §4.3).
//!
//! The `h2` crate enforces RFC 9113 framing and will refuse to emit the
//! malformed frames an H2-downgrade desync probe needs (duplicate
//! pseudo-headers, CRLF inside header names/values, bogus padding lengths).
//! This module hand-rolls the frame header and drives HPACK directly via the
//! `hpack` crate, which encodes exactly the bytes it is given.

use std::collections::HashMap;

use desync_core::{HeaderPair, TransportError};
use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_rustls::TlsConnector;

use crate::http1::Conn;
use crate::tls::{build_tls_config, server_name};

const FRAME_HEADER_LEN: usize = 9;
const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

const TYPE_DATA: u8 = 0x0;
const TYPE_HEADERS: u8 = 0x1;
const TYPE_RST_STREAM: u8 = 0x3;
const TYPE_SETTINGS: u8 = 0x4;
const TYPE_PING: u8 = 0x6;
const TYPE_GOAWAY: u8 = 0x7;
const TYPE_WINDOW_UPDATE: u8 = 0x8;

const FLAG_END_STREAM: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const FLAG_PADDED: u8 = 0x8;
const FLAG_ACK: u8 = 0x1;

/// A parsed 9-byte HTTP/2 frame header.
#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    length: u32,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
}

fn encode_frame_header(length: u32, frame_type: u8, flags: u8, stream_id: u32) -> [u8; FRAME_HEADER_LEN] {
    let mut out = [0u8; FRAME_HEADER_LEN];
    out[0] = (length >> 16) as u8;
    out[1] = (length >> 8) as u8;
    out[2] = length as u8;
    out[3] = frame_type;
    out[4] = flags;
    let sid = stream_id & 0x7fff_ffff;
    out[5] = (sid >> 24) as u8;
    out[6] = (sid >> 16) as u8;
    out[7] = (sid >> 8) as u8;
    out[8] = sid as u8;
    out
}

fn parse_frame_header(bytes: &[u8; FRAME_HEADER_LEN]) -> FrameHeader {
    FrameHeader {
        length: ((bytes[0] as u32) << 16) | ((bytes[1] as u32) << 8) | (bytes[2] as u32),
        frame_type: bytes[3],
        flags: bytes[4],
        stream_id: (((bytes[5] as u32) << 24)
            | ((bytes[6] as u32) << 16)
            | ((bytes[7] as u32) << 8)
            | (bytes[8] as u32))
            & 0x7fff_ffff,
    }
}

fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.extend_from_slice(&encode_frame_header(payload.len() as u32, frame_type, flags, stream_id));
    out.extend_from_slice(payload);
    out
}

/// Everything observed for one stream while draining frames off the wire.
#[derive(Debug, Default, Clone)]
pub struct H2Response {
    pub headers: Vec<HeaderPair>,
    pub body: Vec<u8>,
    pub ended: bool,
    pub reset: bool,
}

impl H2Response {
    pub fn status_code(&self) -> Option<u16> {
        self.headers
            .iter()
            .find(|h| h.name == b":status")
            .and_then(|h| std::str::from_utf8(&h.value).ok())
            .and_then(|s| s.parse().ok())
    }
}

pub struct Http2Transport {
    host: String,
    port: u16,
    verify_tls: bool,
    read_timeout: Duration,
    connect_timeout: Duration,
    conn: Option<Conn>,
    next_stream_id: u32,
    hpack_encoder: HpackEncoder<'static>,
    hpack_decoder: HpackDecoder<'static>,
}

impl Http2Transport {
    pub fn new(host: impl Into<String>, port: u16, read_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            verify_tls: false,
            read_timeout,
            connect_timeout: Duration::from_secs_f64(5.0),
            conn: None,
            next_stream_id: 1,
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
        }
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 2;
        id
    }

    /// TCP connect, TLS handshake negotiating `h2`, connection preface, empty
    /// client SETTINGS frame, then drain the server's initial SETTINGS frame.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let addr = (self.host.as_str(), self.port);
        let tcp = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Connect(format!("connect to {}:{} timed out", self.host, self.port)))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let config = build_tls_config(self.verify_tls, &[b"h2".to_vec(), b"http/1.1".to_vec()]);
        let connector = TlsConnector::from(config);
        let name = server_name(&self.host).map_err(|e| TransportError::Connect(format!("invalid SNI host: {e}")))?;
        let tls_stream = timeout(self.connect_timeout, connector.connect(name, tcp))
            .await
            .map_err(|_| TransportError::Connect("TLS handshake timed out".into()))?
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let negotiated = crate::tls::negotiated_protocol(&tls_stream);
        if negotiated.as_deref() != Some("h2") {
            return Err(TransportError::Protocol(format!(
                "peer did not negotiate h2 (got {negotiated:?})"
            )));
        }
        tracing::debug!(host = %self.host, port = self.port, "h2 connection established");

        let mut conn = Conn::Tls(Box::new(tls_stream));

        let mut preamble = Vec::new();
        preamble.extend_from_slice(CONNECTION_PREFACE);
        preamble.extend_from_slice(&frame(TYPE_SETTINGS, 0, 0, &[]));
        conn.write_all(&preamble).await.map_err(TransportError::Io)?;
        conn.flush().await.map_err(TransportError::Io)?;

        self.conn = Some(conn);
        self.read_until_settings().await?;

        Ok(())
    }

    /// Drain frames until the server's initial SETTINGS frame has been seen,
    /// ACK'ing it and ignoring WINDOW_UPDATE/PING in between.
    async fn read_until_settings(&mut self) -> Result<(), TransportError> {
        loop {
            let header = self.read_frame_header().await?;
            let payload = self.read_frame_payload(header.length).await?;

            match header.frame_type {
                TYPE_SETTINGS if header.flags & FLAG_ACK == 0 => {
                    let conn = self.conn.as_mut().expect("connected");
                    conn.write_all(&frame(TYPE_SETTINGS, FLAG_ACK, 0, &[]))
                        .await
                        .map_err(TransportError::Io)?;
                    conn.flush().await.map_err(TransportError::Io)?;
                    return Ok(());
                }
                TYPE_SETTINGS => return Ok(()), // our own ACK reflected back, unlikely but harmless
                TYPE_GOAWAY => {
                    return Err(TransportError::Protocol(format!(
                        "server sent GOAWAY during handshake: {}",
                        String::from_utf8_lossy(&payload)
                    )))
                }
                _ => continue,
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.shutdown().await;
        }
    }

    async fn read_frame_header(&mut self) -> Result<FrameHeader, TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::Connect("not connected".into()))?;
        let mut buf = [0u8; FRAME_HEADER_LEN];
        timeout(self.read_timeout, conn.read_exact(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Io)?;
        Ok(parse_frame_header(&buf))
    }

    async fn read_frame_payload(&mut self, length: u32) -> Result<Vec<u8>, TransportError> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.as_mut().ok_or(TransportError::Connect("not connected".into()))?;
        let mut buf = vec![0u8; length as usize];
        timeout(self.read_timeout, conn.read_exact(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(TransportError::Io)?;
        Ok(buf)
    }

    /// Encode a HEADERS frame body, deliberately not deduplicating
    /// pseudo-headers and not rejecting CRLF bytes in names/values — HPACK
    /// itself does not care, and neither do we.
    fn encode_headers(&mut self, headers: &[HeaderPair]) -> Vec<u8> {
        let pairs: Vec<(&[u8], &[u8])> = headers.iter().map(|h| (h.name.as_slice(), h.value.as_slice())).collect();
        self.hpack_encoder.encode(pairs)
    }

    fn build_pseudo_headers(method: &str, path: &str, authority: &str, scheme: &str) -> Vec<HeaderPair> {
        vec![
            HeaderPair::new(*b":method", method.as_bytes().to_vec()),
            HeaderPair::new(*b":path", path.as_bytes().to_vec()),
            HeaderPair::new(*b":scheme", scheme.as_bytes().to_vec()),
            HeaderPair::new(*b":authority", authority.as_bytes().to_vec()),
        ]
    }

    /// Send a single-stream request built from a header list the caller has
    /// full control over (pseudo-headers included, duplicated or not). If
    /// `body` is non-empty a DATA frame follows with `END_STREAM`; otherwise
    /// the HEADERS frame itself carries `END_STREAM`.
    pub async fn send_request(
        &mut self,
        headers: &[HeaderPair],
        body: &[u8],
    ) -> Result<u32, TransportError> {
        if self.conn.is_none() {
            self.connect().await?;
        }
        let stream_id = self.allocate_stream_id();
        let block = self.encode_headers(headers);

        let mut flags = FLAG_END_HEADERS;
        if body.is_empty() {
            flags |= FLAG_END_STREAM;
        }

        let conn = self.conn.as_mut().expect("connected above");
        conn.write_all(&frame(TYPE_HEADERS, flags, stream_id, &block))
            .await
            .map_err(TransportError::Io)?;

        if !body.is_empty() {
            conn.write_all(&frame(TYPE_DATA, FLAG_END_STREAM, stream_id, body))
                .await
                .map_err(TransportError::Io)?;
        }
        conn.flush().await.map_err(TransportError::Io)?;

        Ok(stream_id)
    }

    /// Convenience wrapper building pseudo-headers the conventional way, then
    /// appending `extra` (which may itself smuggle a second `:method` or a
    /// CRLF-bearing value, depending on what the caller passes).
    pub async fn send_simple_request(
        &mut self,
        method: &str,
        path: &str,
        authority: &str,
        extra: &[HeaderPair],
        body: &[u8],
    ) -> Result<u32, TransportError> {
        let mut headers = Self::build_pseudo_headers(method, path, authority, "https");
        headers.extend_from_slice(extra);
        self.send_request(&headers, body).await
    }

    /// Send a DATA frame with explicit, possibly-lying padding: `pad_len` is
    /// written into the pad-length octet regardless of whether `padding`
    /// actually contains that many bytes.
    pub async fn send_padded_data(
        &mut self,
        stream_id: u32,
        data: &[u8],
        pad_len: u8,
        padding: &[u8],
        end_stream: bool,
    ) -> Result<(), TransportError> {
        let conn = self.conn.as_mut().ok_or(TransportError::Connect("not connected".into()))?;
        let mut payload = Vec::with_capacity(1 + data.len() + padding.len());
        payload.push(pad_len);
        payload.extend_from_slice(data);
        payload.extend_from_slice(padding);

        let mut flags = FLAG_PADDED;
        if end_stream {
            flags |= FLAG_END_STREAM;
        }

        conn.write_all(&frame(TYPE_DATA, flags, stream_id, &payload))
            .await
            .map_err(TransportError::Io)?;
        conn.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    /// Drain frames until `stream_id` sees `END_STREAM`, a stream reset, a
    /// connection-level GOAWAY, or the read timeout elapses.
    pub async fn read_response(&mut self, stream_id: u32) -> Result<H2Response, TransportError> {
        let mut response = H2Response::default();
        let mut header_fragments: HashMap<u32, Vec<u8>> = HashMap::new();

        loop {
            let header = self.read_frame_header().await?;
            let payload = self.read_frame_payload(header.length).await?;

            match header.frame_type {
                TYPE_HEADERS if header.stream_id == stream_id => {
                    let block = strip_padding_and_priority(&payload, header.flags);
                    let mut acc = header_fragments.remove(&stream_id).unwrap_or_default();
                    acc.extend_from_slice(&block);
                    if header.flags & FLAG_END_HEADERS != 0 {
                        if let Ok(decoded) = self.hpack_decoder.decode(&acc) {
                            response
                                .headers
                                .extend(decoded.into_iter().map(|(n, v)| HeaderPair::new(n, v)));
                        }
                        if header.flags & FLAG_END_STREAM != 0 {
                            response.ended = true;
                            return Ok(response);
                        }
                    } else {
                        header_fragments.insert(stream_id, acc);
                    }
                }
                TYPE_DATA if header.stream_id == stream_id => {
                    let data = strip_data_padding(&payload, header.flags);
                    response.body.extend_from_slice(data);
                    if header.flags & FLAG_END_STREAM != 0 {
                        response.ended = true;
                        return Ok(response);
                    }
                }
                TYPE_RST_STREAM if header.stream_id == stream_id => {
                    response.reset = true;
                    return Ok(response);
                }
                TYPE_GOAWAY => {
                    return Err(TransportError::Protocol(format!(
                        "server sent GOAWAY: {}",
                        String::from_utf8_lossy(&payload)
                    )))
                }
                TYPE_SETTINGS if header.flags & FLAG_ACK == 0 => {
                    let conn = self.conn.as_mut().expect("connected");
                    conn.write_all(&frame(TYPE_SETTINGS, FLAG_ACK, 0, &[]))
                        .await
                        .map_err(TransportError::Io)?;
                    conn.flush().await.map_err(TransportError::Io)?;
                }
                TYPE_PING if header.flags & FLAG_ACK == 0 => {
                    let conn = self.conn.as_mut().expect("connected");
                    conn.write_all(&frame(TYPE_PING, FLAG_ACK, 0, &payload))
                        .await
                        .map_err(TransportError::Io)?;
                    conn.flush().await.map_err(TransportError::Io)?;
                }
                TYPE_WINDOW_UPDATE | TYPE_PING | TYPE_SETTINGS => continue,
                _ => continue, // unrelated stream or frame type, keep draining
            }
        }
    }
}

fn strip_padding_and_priority(payload: &[u8], flags: u8) -> Vec<u8> {
    let mut rest = payload;
    let pad_len = if flags & FLAG_PADDED != 0 && !rest.is_empty() {
        let n = rest[0] as usize;
        rest = &rest[1..];
        n
    } else {
        0
    };
    if flags & 0x20 != 0 && rest.len() >= 5 {
        rest = &rest[5..]; // stream dependency (4) + weight (1)
    }
    let end = rest.len().saturating_sub(pad_len);
    rest[..end].to_vec()
}

fn strip_data_padding(payload: &[u8], flags: u8) -> &[u8] {
    if flags & FLAG_PADDED == 0 || payload.is_empty() {
        return payload;
    }
    let pad_len = payload[0] as usize;
    let rest = &payload[1..];
    let end = rest.len().saturating_sub(pad_len);
    &rest[..end]
}

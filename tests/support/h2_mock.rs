//! A bare-bones HTTP/2 server: just enough preface/SETTINGS/HEADERS handling
//! to let `desync_transport::Http2Transport` complete a request against a
//! scripted delay. Not a conformant h2 implementation — it doesn't need to
//! be, it only has to look like one to our own client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hpack::{Decoder as HpackDecoder, Encoder as HpackEncoder};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::Script;

const FRAME_HEADER_LEN: usize = 9;
const TYPE_DATA: u8 = 0x0;
const TYPE_HEADERS: u8 = 0x1;
const TYPE_SETTINGS: u8 = 0x4;
const FLAG_END_STREAM: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;

fn frame(frame_type: u8, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let len = payload.len() as u32;
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.push(frame_type);
    out.push(flags);
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

struct FrameHeader {
    length: u32,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
}

fn parse_frame_header(b: &[u8; FRAME_HEADER_LEN]) -> FrameHeader {
    FrameHeader {
        length: ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | (b[2] as u32),
        frame_type: b[3],
        flags: b[4],
        stream_id: u32::from_be_bytes([b[5], b[6], b[7], b[8]]) & 0x7fff_ffff,
    }
}

/// Build a self-signed TLS server config that only offers ALPN `h2`.
fn build_server_config() -> Arc<ServerConfig> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certified = generate_simple_self_signed(vec!["localhost".to_string()]).expect("self-signed cert");
    let cert_der = certified.cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der()));

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der], key_der)
        .expect("build server tls config");
    config.alpn_protocols = vec![b"h2".to_vec()];
    Arc::new(config)
}

/// Spawn an HTTP/2-over-TLS mock that serves one scripted response per
/// accepted connection, each on whatever the first client stream turns out
/// to be.
pub async fn spawn_h2_mock(scripts: Vec<Script>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind h2 mock listener");
    let addr = listener.local_addr().expect("local addr");
    let acceptor = TlsAcceptor::from(build_server_config());
    let scripts = Arc::new(std::sync::Mutex::new(std::collections::VecDeque::from(scripts)));

    tokio::spawn(async move {
        loop {
            let Ok((tcp, _)) = listener.accept().await else {
                break;
            };
            let acceptor = acceptor.clone();
            let scripts = scripts.clone();

            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(tcp).await else {
                    return;
                };

                // Greet first: our own client waits for a server SETTINGS
                // frame before it will send anything on a new stream.
                if tls.write_all(&frame(TYPE_SETTINGS, 0, 0, &[])).await.is_err() {
                    return;
                }

                let Some((stream_id, _headers, _body)) = read_request(&mut tls).await else {
                    return;
                };

                let script = scripts.lock().expect("lock scripts").pop_front();
                match script {
                    Some(Script::Respond { delay, .. }) => {
                        tokio::time::sleep(delay).await;
                        let mut encoder = HpackEncoder::new();
                        let block = encoder.encode(vec![(&b":status"[..], &b"200"[..])]);
                        let _ = tls
                            .write_all(&frame(
                                TYPE_HEADERS,
                                FLAG_END_HEADERS | FLAG_END_STREAM,
                                stream_id,
                                &block,
                            ))
                            .await;
                    }
                    Some(Script::HangUp) | None => {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    }
                }
            });
        }
    });

    addr
}

/// Drain frames until a HEADERS frame's stream sees END_STREAM, ignoring the
/// client's own preface/SETTINGS/ACK traffic along the way.
async fn read_request<S: AsyncReadExt + AsyncWriteExt + Unpin>(
    stream: &mut S,
) -> Option<(u32, Vec<(Vec<u8>, Vec<u8>)>, Vec<u8>)> {
    let mut preface = [0u8; 24];
    stream.read_exact(&mut preface).await.ok()?;

    let mut decoder = HpackDecoder::new();
    let mut target_stream = None;
    let mut headers = Vec::new();
    let mut body = Vec::new();

    loop {
        let mut header_buf = [0u8; FRAME_HEADER_LEN];
        stream.read_exact(&mut header_buf).await.ok()?;
        let header = parse_frame_header(&header_buf);
        let mut payload = vec![0u8; header.length as usize];
        if header.length > 0 {
            stream.read_exact(&mut payload).await.ok()?;
        }

        match header.frame_type {
            TYPE_HEADERS => {
                target_stream = Some(header.stream_id);
                if let Ok(decoded) = decoder.decode(&payload) {
                    headers.extend(decoded);
                }
                if header.flags & FLAG_END_STREAM != 0 {
                    return Some((header.stream_id, headers, body));
                }
            }
            TYPE_DATA if Some(header.stream_id) == target_stream => {
                body.extend_from_slice(&payload);
                if header.flags & FLAG_END_STREAM != 0 {
                    return Some((header.stream_id, headers, body));
                }
            }
            _ => continue,
        }
    }
}

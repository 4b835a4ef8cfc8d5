//! Step 1 of spec §4.5: one benign GET per class, timed.

use std::time::{Duration, Instant};

use desync_core::{DesyncError, HeaderPair, ScanOptions, Target};
use desync_transport::{Http1Transport, Http2Transport};

#[derive(Debug, Clone, Copy)]
pub struct Baseline {
    pub response_time: Duration,
    pub status_code: Option<u16>,
}

fn host_header(target: &Target) -> HeaderPair {
    HeaderPair::new(b"Host".to_vec(), target.host.clone().into_bytes())
}

pub async fn run_http1(target: &Target, options: &ScanOptions) -> Result<Baseline, DesyncError> {
    let mut headers = vec![host_header(target)];
    headers.extend(options.custom_headers.iter().cloned());

    let mut transport = Http1Transport::new(&target.host, target.port, target.tls, options.timeout);
    transport.connect().await.map_err(DesyncError::Transport)?;

    let t0 = Instant::now();
    let result = transport.send_request("GET", &target.path, &headers, b"", None).await;
    let elapsed = t0.elapsed();
    transport.close().await;

    let (info, _) = result.map_err(DesyncError::Transport)?;
    Ok(Baseline { response_time: elapsed, status_code: Some(info.status_code) })
}

pub async fn run_h2(target: &Target, options: &ScanOptions) -> Result<Baseline, DesyncError> {
    let authority = format!("{}:{}", target.host, target.port);
    let mut transport = Http2Transport::new(&target.host, target.port, options.timeout);
    transport.connect().await.map_err(DesyncError::Transport)?;

    let t0 = Instant::now();
    let result = async {
        let stream_id = transport
            .send_simple_request("GET", &target.path, &authority, &options.custom_headers, b"")
            .await?;
        transport.read_response(stream_id).await
    }
    .await;
    let elapsed = t0.elapsed();
    transport.close().await;

    let response = result.map_err(DesyncError::Transport)?;
    Ok(Baseline { response_time: elapsed, status_code: response.status_code() })
}

//! H2.TE engine (spec §4.5). The front-end downgrades HTTP/2 to HTTP/1
//! toward the back-end; an injected Transfer-Encoding token, smuggled past
//! the front-end's pseudo-header validation, makes the back-end wait for a
//! chunk body that the incomplete terminator never supplies. Classification
//! is by `t_probe` alone — there is no confirmation connection for H2.

use std::time::Instant;

use desync_core::{Class, DesyncError, Finding, MutationCatalogue, ProbeResult, ScanOptions, Target};
use desync_transport::Http2Transport;

use crate::baseline::Baseline;
use crate::classify::{classify, Verdict};
use crate::h2_common::{build_headers, render_headers};

const PROBE_BODY: &[u8] = b"0\r\n";

pub async fn run(
    target: &Target,
    catalogue: &MutationCatalogue,
    baseline: &Baseline,
    options: &ScanOptions,
) -> Result<(Vec<ProbeResult>, Vec<Finding>), DesyncError> {
    let mut results = Vec::new();
    let mut findings = Vec::new();

    for mutation in catalogue.iter() {
        let placement = options.h2_payload_placement.unwrap_or(mutation.placement);
        let headers = build_headers(
            target,
            &mutation.header_name,
            &mutation.header_value,
            mutation,
            placement,
            options,
        );
        let raw = render_headers(&headers, PROBE_BODY);

        let mut transport = Http2Transport::new(&target.host, target.port, options.timeout);
        let t0 = Instant::now();
        let outcome = async {
            let stream_id = transport.send_request(&headers, PROBE_BODY).await?;
            transport.read_response(stream_id).await
        }
        .await;
        let elapsed = t0.elapsed();
        transport.close().await;

        let (status_code, timed_out, error) = match &outcome {
            Ok(resp) => (resp.status_code(), false, None),
            Err(desync_core::TransportError::Timeout) => (None, true, None),
            Err(e) => (None, false, Some(e.to_string())),
        };

        let mut probe = ProbeResult {
            mutation: mutation.clone(),
            status_code,
            response_time: elapsed,
            timed_out,
            error: error.clone(),
            raw_request_bytes: raw,
            confirm: None,
        };

        if error.is_some() && !timed_out {
            results.push(probe);
            continue;
        }

        match classify(status_code, timed_out, elapsed, baseline.response_time, true) {
            Verdict::Vulnerable { ratio, reason } => {
                findings.push(Finding {
                    class: Class::H2Te,
                    mutation_description: mutation.description.clone(),
                    header_name: mutation.header_name.clone(),
                    header_value: mutation.header_value.clone(),
                    placement: Some(placement),
                    response_time: elapsed,
                    baseline_time: baseline.response_time,
                    ratio,
                    reason,
                    raw_request: probe.raw_request_bytes.clone(),
                    confirm_raw_request: None,
                });
                results.push(probe);
                if options.exit_first {
                    return Ok((results, findings));
                }
            }
            Verdict::Clean => results.push(probe),
            Verdict::NeedsConfirmation { .. } => {
                probe.error = Some("unexpected confirmation-gated verdict for an H2 class".into());
                results.push(probe);
            }
        }
    }

    Ok((results, findings))
}

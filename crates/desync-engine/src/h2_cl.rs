//! H2.CL engine (spec §4.5). Analogous to H2.TE, but the downgrade rewrite
//! injects a Content-Length token whose value exceeds the bytes actually
//! sent, so the back-end blocks waiting for a body tail that never arrives.
//! The Python source this was distilled from never shipped a dedicated file
//! for this class despite dispatching to it by name; this treats H2.CL as
//! first-class and symmetric with H2.TE.

use std::time::Instant;

use desync_core::{Class, DesyncError, Finding, Mutation, MutationCatalogue, ProbeResult, ScanOptions, Target};
use desync_transport::Http2Transport;

use crate::baseline::Baseline;
use crate::classify::{classify, Verdict};
use crate::h2_common::{build_headers, render_headers};

const PROBE_BODY: &[u8] = b"x";
const CLAIMED_LENGTH_SLACK: usize = 1000;

pub async fn run(
    target: &Target,
    catalogue: &MutationCatalogue,
    baseline: &Baseline,
    options: &ScanOptions,
) -> Result<(Vec<ProbeResult>, Vec<Finding>), DesyncError> {
    let mut results = Vec::new();
    let mut findings = Vec::new();

    for entry in catalogue.iter() {
        let claimed_length = (PROBE_BODY.len() + CLAIMED_LENGTH_SLACK).to_string();
        // Reuse the catalogue entry's description/placement/extra_headers, but
        // the injected token is always a Content-Length mismatch for this class.
        let mutation = Mutation::new(entry.description.clone(), "Content-Length", claimed_length)
            .with_placement(entry.placement)
            .with_extra_headers(entry.extra_headers.clone());

        let placement = options.h2_payload_placement.unwrap_or(mutation.placement);
        let headers = build_headers(
            target,
            &mutation.header_name,
            &mutation.header_value,
            &mutation,
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
                    class: Class::H2Cl,
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

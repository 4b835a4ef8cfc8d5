//! TE.CL engine (spec §4.5). Front-end trusts Transfer-Encoding and forwards
//! only the terminating chunk; the back-end trusts Content-Length and blocks
//! waiting for bytes that were never sent.

use std::time::Instant;

use desync_core::{Class, ConfirmResult, DesyncError, Finding, Mutation, MutationCatalogue, ProbeResult, ScanOptions, Target, TransportError};
use desync_transport::Http1Transport;

use crate::baseline::Baseline;
use crate::classify::{classify, Verdict};
use crate::common::assemble_headers;

const BODY: &[u8] = b"0\r\n\r\nX";

pub async fn run(
    target: &Target,
    catalogue: &MutationCatalogue,
    baseline: &Baseline,
    options: &ScanOptions,
) -> Result<(Vec<ProbeResult>, Vec<Finding>), DesyncError> {
    let mut results = Vec::new();
    let mut findings = Vec::new();

    for mutation in catalogue.iter() {
        let probe = run_request(target, mutation, options, 6).await;

        if probe.error.is_some() && !probe.timed_out {
            results.push(probe);
            continue;
        }

        let verdict = classify(probe.status_code, probe.timed_out, probe.response_time, baseline.response_time, false);

        let mut probe = probe;
        match verdict {
            Verdict::Clean => results.push(probe),
            Verdict::NeedsConfirmation { ratio, reason } => {
                let confirm_probe = run_request(target, mutation, options, 5).await;
                let confirm = ConfirmResult {
                    status_code: confirm_probe.status_code,
                    response_time: confirm_probe.response_time,
                    timed_out: confirm_probe.timed_out,
                    error: confirm_probe.error.clone(),
                    raw_request_bytes: confirm_probe.raw_request_bytes.clone(),
                };
                let confirmed = !confirm.timed_out && confirm.error.is_none();
                if confirmed {
                    findings.push(Finding {
                        class: Class::TeCl,
                        mutation_description: mutation.description.clone(),
                        header_name: mutation.header_name.clone(),
                        header_value: mutation.header_value.clone(),
                        placement: None,
                        response_time: probe.response_time,
                        baseline_time: baseline.response_time,
                        ratio,
                        reason,
                        raw_request: probe.raw_request_bytes.clone(),
                        confirm_raw_request: Some(confirm.raw_request_bytes.clone()),
                    });
                }
                probe.confirm = Some(confirm);
                results.push(probe);
                if options.exit_first && !findings.is_empty() {
                    return Ok((results, findings));
                }
            }
            Verdict::Vulnerable { .. } => unreachable!("HTTP/1 classes never classify as Vulnerable directly"),
        }
    }

    Ok((results, findings))
}

async fn run_request(
    target: &Target,
    mutation: &Mutation,
    options: &ScanOptions,
    content_length: usize,
) -> ProbeResult {
    let headers = assemble_headers(target, content_length, mutation, options);
    let raw = Http1Transport::serialize_request("POST", &target.path, &headers, BODY);

    let mut transport = Http1Transport::new(&target.host, target.port, target.tls, options.timeout);
    let t0 = Instant::now();
    let send = transport.send_request("POST", &target.path, &headers, BODY, None).await;
    let elapsed = t0.elapsed();
    transport.close().await;

    let (status_code, timed_out, error) = match &send {
        Ok((info, _)) => (Some(info.status_code), false, None),
        Err(TransportError::Timeout) => (None, true, None),
        Err(e) => (None, false, Some(e.to_string())),
    };

    ProbeResult {
        mutation: mutation.clone(),
        status_code,
        response_time: elapsed,
        timed_out,
        error,
        raw_request_bytes: raw,
        confirm: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_terminator_chunk_plus_one_trailing_byte() {
        assert_eq!(BODY.len(), 6);
        assert_eq!(BODY, b"0\r\n\r\nX");
    }
}

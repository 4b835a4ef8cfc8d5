//! CL.TE engine (spec §4.5). Front-end trusts Content-Length and forwards a
//! short prefix; the back-end trusts Transfer-Encoding and blocks waiting for
//! the chunk body the front-end never sent.

use std::time::Instant;

use desync_core::{Class, ConfirmResult, DesyncError, Finding, Mutation, MutationCatalogue, ProbeResult, ScanOptions, Target, TransportError};
use desync_transport::Http1Transport;

use crate::baseline::Baseline;
use crate::classify::{classify, Verdict};
use crate::common::assemble_headers;

const PROBE_BODY: &[u8] = b"1\r\nZ\r\nQ\r\n";
const CONFIRM_BODY: &[u8] = b"1\r\nZ\r\n0\r\n\r\n";

pub async fn run(
    target: &Target,
    catalogue: &MutationCatalogue,
    baseline: &Baseline,
    options: &ScanOptions,
) -> Result<(Vec<ProbeResult>, Vec<Finding>), DesyncError> {
    let mut results = Vec::new();
    let mut findings = Vec::new();

    for mutation in catalogue.iter() {
        let probe = run_probe(target, mutation, options).await;

        if probe.error.is_some() && !probe.timed_out {
            results.push(probe);
            continue;
        }

        let verdict = classify(probe.status_code, probe.timed_out, probe.response_time, baseline.response_time, false);

        let mut probe = probe;
        match verdict {
            Verdict::Clean => results.push(probe),
            Verdict::NeedsConfirmation { ratio, reason } => {
                let confirm = run_confirm(target, mutation, options).await;
                let confirmed = !confirm.timed_out && confirm.error.is_none();
                if confirmed {
                    findings.push(Finding {
                        class: Class::ClTe,
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

async fn run_probe(target: &Target, mutation: &Mutation, options: &ScanOptions) -> ProbeResult {
    let headers = assemble_headers(target, 4, mutation, options);
    let raw = Http1Transport::serialize_request("POST", &target.path, &headers, PROBE_BODY);

    let mut transport = Http1Transport::new(&target.host, target.port, target.tls, options.timeout);
    let t0 = Instant::now();
    let send = transport.send_request("POST", &target.path, &headers, PROBE_BODY, None).await;
    let elapsed = t0.elapsed();
    transport.close().await;

    let (status_code, timed_out, error) = outcome(&send);

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

async fn run_confirm(target: &Target, mutation: &Mutation, options: &ScanOptions) -> ConfirmResult {
    let headers = assemble_headers(target, 11, mutation, options);
    let raw = Http1Transport::serialize_request("POST", &target.path, &headers, CONFIRM_BODY);

    let mut transport = Http1Transport::new(&target.host, target.port, target.tls, options.timeout);
    let t0 = Instant::now();
    let send = transport.send_request("POST", &target.path, &headers, CONFIRM_BODY, None).await;
    let elapsed = t0.elapsed();
    transport.close().await;

    let (status_code, timed_out, error) = outcome(&send);
    ConfirmResult { status_code, response_time: elapsed, timed_out, error, raw_request_bytes: raw }
}

type SendResult = Result<(desync_transport::ResponseInfo, Vec<u8>), TransportError>;

fn outcome(send: &SendResult) -> (Option<u16>, bool, Option<String>) {
    match send {
        Ok((info, _)) => (Some(info.status_code), false, None),
        Err(TransportError::Timeout) => (None, true, None),
        Err(e) => (None, false, Some(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_body_is_the_stub_chunk_followed_by_unterminated_q() {
        assert_eq!(PROBE_BODY, b"1\r\nZ\r\nQ\r\n");
        assert_eq!(PROBE_BODY.len(), 9);
    }

    #[test]
    fn confirm_body_is_a_complete_chunked_message_of_length_eleven() {
        assert_eq!(CONFIRM_BODY.len(), 11);
        assert_eq!(CONFIRM_BODY, b"1\r\nZ\r\n0\r\n\r\n");
    }
}

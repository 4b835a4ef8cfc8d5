//! Scenario S5 (spec §8): the probe gets back a body with no recognisable
//! status line. That is an error record, not a timeout and not a finding.

mod support;

use std::time::Duration;

use desync::{scan, Class, Mutation, MutationCatalogue, ScanOptions, Target};
use support::{spawn_http1_mock, Script};

#[tokio::test]
async fn malformed_response_is_recorded_as_an_error_not_a_finding() {
    let addr = spawn_http1_mock(vec![
        Script::ok(Duration::from_millis(40)), // baseline
        Script::Respond {
            delay: Duration::from_millis(10),
            bytes: b"this is not an HTTP response\r\n\r\n".to_vec(),
        }, // probe: garbage
    ])
    .await;

    let target = Target::new(addr.ip().to_string(), addr.port(), false);
    let catalogue = MutationCatalogue::from_mutations(vec![Mutation::new(
        "Standard chunked encoding",
        "Transfer-Encoding",
        "chunked",
    )]);
    let options = ScanOptions {
        timeout: Duration::from_millis(250),
        ..ScanOptions::default()
    };

    let report = scan(&target, &[Class::ClTe], &catalogue, &options)
        .await
        .expect("scan completes");

    assert!(report.findings.is_empty());
    let (class, results) = &report.results[0];
    assert_eq!(*class, Class::ClTe);
    assert_eq!(results.len(), 1);
    assert!(!results[0].timed_out);
    assert!(results[0].error.is_some());
    assert!(results[0].confirm.is_none(), "errored probes never reach confirmation");
}

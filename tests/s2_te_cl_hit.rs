//! Scenario S2 (spec §8): the obfuscated header variant (a space before the
//! colon) still triggers a TE.CL finding.

mod support;

use std::time::Duration;

use desync::{scan, Class, Mutation, MutationCatalogue, ScanOptions, Target};
use support::{spawn_http1_mock, Script};

#[tokio::test]
async fn te_cl_hit_with_obfuscated_header() {
    let addr = spawn_http1_mock(vec![
        Script::ok(Duration::from_millis(35)), // baseline
        Script::HangUp,                        // probe stalls
        Script::ok(Duration::from_millis(30)), // confirm completes
    ])
    .await;

    let target = Target::new(addr.ip().to_string(), addr.port(), false);
    let catalogue = MutationCatalogue::from_mutations(vec![Mutation::new(
        "Space after header name",
        "Transfer-Encoding ",
        "chunked",
    )]);
    let options = ScanOptions {
        timeout: Duration::from_millis(250),
        ..ScanOptions::default()
    };

    let report = scan(&target, &[Class::TeCl], &catalogue, &options)
        .await
        .expect("scan completes");

    assert_eq!(report.findings.len(), 1);
    assert_eq!(report.findings[0].class, Class::TeCl);
    assert_eq!(report.findings[0].header_name, b"Transfer-Encoding ");
}

//! Scan orchestrator (spec §4.6). Dispatches each enabled class's engine in
//! sequence — classes are the natural parallelism boundary, but the target
//! is probed sequentially to keep load and timing noise minimal.

use desync_core::{Class, DesyncError, Finding, MutationCatalogue, ProbeResult, ScanOptions, Target};
use tracing::Instrument;

use crate::{baseline, cl_te, h2_cl, h2_te, te_cl};

/// Everything one scan produced: the findings plus, per class, every probe
/// attempted — including ones that errored without timing out (spec §7: "a
/// probe that errored without a timeout does not produce a finding, it
/// produces an error record alongside the normal results").
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
    pub results: Vec<(Class, Vec<ProbeResult>)>,
}

pub async fn scan(
    target: &Target,
    classes: &[Class],
    catalogue: &MutationCatalogue,
    options: &ScanOptions,
) -> Result<ScanReport, DesyncError> {
    let mut report = ScanReport::default();

    for &class in classes {
        let span = tracing::info_span!("probe_class", class = %class, host = %target.host, port = target.port);
        let outcome = run_class(target, class, catalogue, options).instrument(span).await;

        let (results, mut findings) = match outcome {
            Ok(v) => v,
            Err(ClassError::BaselineFailed(e)) => {
                tracing::warn!(class = %class, error = %e, "baseline failed, skipping class");
                continue;
            }
            Err(ClassError::Desync(e)) => return Err(e),
        };

        let exit_first_hit = options.exit_first && !findings.is_empty();
        report.findings.append(&mut findings);
        report.results.push((class, results));

        if exit_first_hit {
            break;
        }
    }

    Ok(report)
}

enum ClassError {
    BaselineFailed(DesyncError),
    Desync(DesyncError),
}

async fn run_class(
    target: &Target,
    class: Class,
    catalogue: &MutationCatalogue,
    options: &ScanOptions,
) -> Result<(Vec<ProbeResult>, Vec<Finding>), ClassError> {
    let baseline_result = if class.is_http2() {
        baseline::run_h2(target, options).await
    } else {
        baseline::run_http1(target, options).await
    };
    let baseline = baseline_result.map_err(ClassError::BaselineFailed)?;

    match class {
        Class::ClTe => cl_te::run(target, catalogue, &baseline, options).await,
        Class::TeCl => te_cl::run(target, catalogue, &baseline, options).await,
        Class::H2Te => h2_te::run(target, catalogue, &baseline, options).await,
        Class::H2Cl => h2_cl::run(target, catalogue, &baseline, options).await,
    }
    .map_err(ClassError::Desync)
}

#[cfg(test)]
mod tests {
    use super::*;
    use desync_core::Target;

    #[test]
    fn empty_class_list_yields_empty_report_shape() {
        // A report with no classes run is just the default — exercised fully
        // by the end-to-end scenarios in tests/, this only pins the shape.
        let report = ScanReport::default();
        assert!(report.findings.is_empty());
        assert!(report.results.is_empty());
    }

    #[test]
    fn target_used_by_scan_carries_host_and_port() {
        let target = Target::new("example.com", 8443, true).with_path("/login");
        assert_eq!(target.port, 8443);
        assert_eq!(target.path, "/login");
    }
}

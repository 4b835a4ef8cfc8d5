//! Pure outcome classification (spec §4.5 step 2.4). No I/O, no clock reads —
//! everything here takes already-measured durations and is exhaustively
//! unit-testable without a mock server.

use std::time::Duration;

/// What a single probe observation implies about the target.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Nothing unusual; do not run a confirmation.
    Clean,
    /// HTTP/1 classes only: suspicious enough to re-send a well-framed
    /// confirmation before promoting to a finding.
    NeedsConfirmation { ratio: f64, reason: String },
    /// HTTP/2 classes: classification is final, no confirmation step exists.
    Vulnerable { ratio: f64, reason: String },
}

fn ratio(t_probe: Duration, t_base: Duration) -> f64 {
    let base = t_base.as_secs_f64();
    if base <= 0.0 {
        return f64::INFINITY;
    }
    t_probe.as_secs_f64() / base
}

/// Classify one probe's outcome against its class baseline.
///
/// `is_http2` selects between the two regimes spec §4.5 step 2.4 describes:
/// HTTP/1 classes always gate on a confirmation probe, HTTP/2 classes decide
/// outright from `t_probe` alone (no confirmation connection is made).
pub fn classify(
    status_code: Option<u16>,
    timed_out: bool,
    t_probe: Duration,
    t_base: Duration,
    is_http2: bool,
) -> Verdict {
    let r = ratio(t_probe, t_base);

    if is_http2 {
        if timed_out {
            return Verdict::Vulnerable { ratio: r, reason: "probe timeout".into() };
        }
        if r >= 3.0 {
            return Verdict::Vulnerable {
                ratio: r,
                reason: format!("elevated latency {r:.2}x baseline"),
            };
        }
        return Verdict::Clean;
    }

    if timed_out {
        return Verdict::NeedsConfirmation { ratio: r, reason: "probe timeout".into() };
    }

    if matches!(status_code, Some(400) | Some(408) | Some(500)) && r >= 1.5 {
        return Verdict::NeedsConfirmation {
            ratio: r,
            reason: format!("status {} at {r:.2}x baseline", status_code.unwrap()),
        };
    }

    if r >= 3.0 {
        return Verdict::NeedsConfirmation {
            ratio: r,
            reason: format!("elevated latency {r:.2}x baseline"),
        };
    }

    Verdict::Clean
}

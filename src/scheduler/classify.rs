//! Classification of completed probes.

use crate::db::Outcome;
use crate::probe::ProbeReport;
use std::time::Duration;

/// Classify one completed probe.
///
/// Any failure is unreachable. A success slower than half the timeout is
/// degraded.
pub fn classify(report: &ProbeReport, timeout: Duration) -> Outcome {
    match report.result {
        Err(_) => Outcome::Unreachable,
        Ok(()) if report.elapsed > timeout / 2 => Outcome::Degraded,
        Ok(()) => Outcome::Healthy,
    }
}

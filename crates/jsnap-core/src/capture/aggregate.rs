//! Batch outcome aggregation.
//!
//! Combines the per-item outcomes of a batch (for example, one glob
//! pattern expanding to many log files) into a single result. Partial
//! success is success: a batch only fails wholesale when no item at all
//! succeeded.

use super::CaptureResult;
use jsnap_common::Error;

/// Delimiter between per-item fragments in the combined report.
const REPORT_DELIMITER: &str = "; ";

/// Combine per-item outcomes into one result.
///
/// The combined message concatenates each item's message, its ok flag,
/// and its error text if present. Overall `ok` is the logical OR of the
/// item flags. The returned error is the *last* error seen, and only
/// when no item succeeded; with at least one success the batch reports
/// no error even if individual items failed.
pub fn summarize(outcomes: Vec<(CaptureResult, Option<Error>)>) -> (CaptureResult, Option<Error>) {
    let mut report = String::new();
    let mut any_ok = false;
    let mut last_error: Option<Error> = None;

    for (result, error) in outcomes {
        if !report.is_empty() {
            report.push_str(REPORT_DELIMITER);
        }
        report.push_str(&result.message);
        report.push_str(&format!(" (ok: {})", result.ok));
        if let Some(ref e) = error {
            report.push_str(&format!(" [error: {e}]"));
        }

        any_ok = any_ok || result.ok;
        if let Some(e) = error {
            last_error = Some(e);
        }
    }

    if any_ok {
        (CaptureResult::success(report), None)
    } else {
        (CaptureResult::failure(report), last_error)
    }
}

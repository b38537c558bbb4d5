use serde::Serialize;

use crate::normalize::{Normalized, ScanAction, ScanStatus};

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_BLOCKED: i32 = 2;

/// Final decision handed to whoever terminates the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub status: ScanStatus,
    pub exit_code: i32,
}

/// Derive the outcome from a normalized verdict.
///
/// Errors map to `1`, blocked verdicts to `2`, everything else to `0`. A reply
/// that reported an error but also advised `block` was already normalized into
/// a blocked verdict, so automation keyed on exit code `2` still halts.
pub fn resolve(normalized: &Normalized) -> PolicyOutcome {
    match normalized {
        Normalized::Error(_) => PolicyOutcome {
            status: ScanStatus::Error,
            exit_code: EXIT_ERROR,
        },
        Normalized::Scan(result) if result.action == ScanAction::Block => PolicyOutcome {
            status: ScanStatus::Blocked,
            exit_code: EXIT_BLOCKED,
        },
        Normalized::Scan(result) => PolicyOutcome {
            status: result.status,
            exit_code: EXIT_OK,
        },
    }
}

//! Shareholder concentration trend.
//!
//! A falling number of holders across consecutive quarters suggests chips
//! are concentrating into fewer hands.

use tracing::debug;

use crate::data::{SecurityId, ShareholderSnapshotSet};

/// Periods that must show a strict decline.
pub const REQUIRED_PERIODS: usize = 3;

/// True iff the security's holder count strictly decreased over the three
/// most recent periods it appears in.
///
/// Fails closed when the set holds fewer than three distinct periods or the
/// security is missing from any of them.
pub fn holder_count_declining(id: &SecurityId, set: &ShareholderSnapshotSet) -> bool {
    if set.period_count() < REQUIRED_PERIODS {
        debug!(security = %id, periods = set.period_count(), "Not enough shareholder periods");
        return false;
    }

    let mut snapshots = set.snapshots_for(id);
    if snapshots.len() < REQUIRED_PERIODS {
        debug!(security = %id, found = snapshots.len(), "Security missing from shareholder tables");
        return false;
    }

    // Most recent first
    snapshots.sort_by(|a, b| b.period_end.cmp(&a.period_end));

    snapshots
        .windows(2)
        .take(REQUIRED_PERIODS - 1)
        .all(|pair| pair[0].holder_count < pair[1].holder_count)
}

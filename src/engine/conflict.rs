use chrono::NaiveDateTime;
use tracing::warn;

use crate::model::*;

/// An existing appointment as the detector sees it. `start` or `duration_min`
/// is `None` when the stored data could not be resolved.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: AppointmentId,
    pub status: AppointmentStatus,
    pub start: Option<NaiveDateTime>,
    pub duration_min: Option<u32>,
}

/// First non-cancelled candidate whose slot overlaps the proposed one.
pub fn find_conflict(
    start: NaiveDateTime,
    duration_min: u32,
    candidates: &[Candidate],
    exclude: Option<AppointmentId>,
) -> Option<AppointmentId> {
    let proposed = Span::slot(start, duration_min);
    for c in candidates {
        if !c.status.occupies_slot() || Some(c.id) == exclude {
            continue;
        }
        let (Some(c_start), Some(c_duration)) = (c.start, c.duration_min) else {
            warn!("skipping appointment {} in conflict check: unresolvable slot", c.id);
            continue;
        };
        if proposed.overlaps(&Span::slot(c_start, c_duration)) {
            return Some(c.id);
        }
    }
    None
}

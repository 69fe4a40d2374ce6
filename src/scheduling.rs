//! Slot catalog and availability computation.
//!
//! Battles run in fixed hour-long slots from 2 PM to 11 PM local time. A slot
//! on a given date is occupied while some request for it is pending or
//! confirmed; rejecting a request frees its slot.
//!
//! Availability is computed by scanning the full stored request list. There is
//! no precomputed cache: request volume is at most a few thousand rows, and
//! the result is advisory UI input; the authoritative guard is the partial
//! unique index enforced at insert time.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::battle_requests::BattleRequest;

/// The ten bookable time-of-day labels, in display order.
pub const SLOT_CATALOG: [&str; 10] = [
    "2:00 PM", "3:00 PM", "4:00 PM", "5:00 PM", "6:00 PM", "7:00 PM", "8:00 PM", "9:00 PM", "10:00 PM", "11:00 PM",
];

/// Position of a label within the catalog, if it is a known slot.
pub fn slot_index(label: &str) -> Option<usize> {
    SLOT_CATALOG.iter().position(|slot| *slot == label)
}

pub fn is_valid_slot(label: &str) -> bool {
    slot_index(label).is_some()
}

/// Availability of a single catalog slot on the queried date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SlotAvailability {
    /// Slot label, e.g. "5:00 PM"
    pub time: String,
    pub available: bool,
}

/// Compute availability for every catalog slot on `date`.
///
/// `available(s)` is false iff some request exists with the same date, the
/// same slot label, and a status that occupies the slot. The result always
/// holds exactly the ten catalog slots, in catalog order, regardless of how
/// many requests exist.
pub fn availability_for(date: NaiveDate, requests: &[BattleRequest]) -> Vec<SlotAvailability> {
    SLOT_CATALOG
        .iter()
        .map(|slot| {
            let taken = requests.iter().any(|request| {
                request.requested_date == date && request.requested_time == *slot && request.status.occupies_slot()
            });
            SlotAvailability {
                time: slot.to_string(),
                available: !taken,
            }
        })
        .collect()
}

/// Every catalog slot marked available. Returned when no (usable) date was
/// supplied: the check fails open rather than erroring, since it is an
/// advisory affordance and not a server-side allocation guarantee.
pub fn all_available() -> Vec<SlotAvailability> {
    SLOT_CATALOG
        .iter()
        .map(|slot| SlotAvailability {
            time: slot.to_string(),
            available: true,
        })
        .collect()
}

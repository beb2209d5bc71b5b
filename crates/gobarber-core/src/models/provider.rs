use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// First hour that counts as afternoon when grouping slots.
const AFTERNOON_START_HOUR: u32 = 12;

/// A barber listed by `GET providers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// One hour slot from `GET providers/:id/day-availability`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct HourAvailability {
    pub hour: u32,
    pub available: bool,
}

impl HourAvailability {
    /// Display form, e.g. `08:00`
    pub fn hour_display(&self) -> String {
        format!("{:02}:00", self.hour)
    }
}

/// Slots of a day grouped the way the booking screen shows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayPeriods {
    pub morning: Vec<HourAvailability>,
    pub afternoon: Vec<HourAvailability>,
}

impl DayPeriods {
    pub fn available_hours(&self) -> impl Iterator<Item = u32> + '_ {
        self.morning
            .iter()
            .chain(self.afternoon.iter())
            .filter(|slot| slot.available)
            .map(|slot| slot.hour)
    }
}

/// Split a day's slots into morning and afternoon, sorted by hour.
pub fn split_by_period(slots: &[HourAvailability]) -> DayPeriods {
    let mut sorted = slots.to_vec();
    sorted.sort_by_key(|slot| slot.hour);
    let (morning, afternoon) = sorted
        .into_iter()
        .partition(|slot| slot.hour < AFTERNOON_START_HOUR);
    DayPeriods { morning, afternoon }
}

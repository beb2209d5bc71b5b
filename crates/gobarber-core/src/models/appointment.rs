use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Body of `POST appointments`
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct NewAppointment {
    pub provider_id: String,
    pub date: DateTime<Utc>,
}

/// A booked appointment as echoed back by the server.
/// Only the fields the client shows are typed; the rest is ignored.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Appointment {
    #[serde(default)]
    pub id: Option<String>,
    pub provider_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub date: DateTime<Utc>,
}

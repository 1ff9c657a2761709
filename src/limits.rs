pub const MAX_NAME_LEN: usize = 120;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_TIMESTAMP_LEN: usize = 64;

/// No single service may run longer than a day.
pub const MAX_SERVICE_DURATION_MIN: u32 = 24 * 60;

/// Longest configurable client-cancellation lead: one week.
pub const MAX_CANCEL_LEAD_MINUTES: i64 = 7 * 24 * 60;

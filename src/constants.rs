/// Points granted to staff and admins for chat participation.
pub const CHAT_REWARD_POINTS: i64 = 5;

pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Breach scans run hourly unless overridden.
pub const DEFAULT_SLA_SCAN_INTERVAL_SECS: u64 = 3600;

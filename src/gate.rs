// Time gate: only collect during the local daytime window.
// Local time is a fixed offset from UTC (no DST), default UTC+8.

use chrono::{DateTime, FixedOffset, SecondsFormat, SubsecRound, Timelike, Utc};

use crate::config::ScheduleConfig;

const SECS_PER_HOUR: i32 = 3600;

/// Singapore time (UTC+8).
const DEFAULT_OFFSET: FixedOffset = match FixedOffset::east_opt(8 * SECS_PER_HOUR) {
    Some(offset) => offset,
    None => panic!("invalid default offset"),
};

#[derive(Debug, Clone, Copy)]
pub struct TimeGate {
    offset: FixedOffset,
    active_from_hour: u32,
    active_until_hour: u32,
}

impl Default for TimeGate {
    fn default() -> Self {
        Self {
            offset: DEFAULT_OFFSET,
            active_from_hour: 6,
            active_until_hour: 24,
        }
    }
}

impl TimeGate {
    pub fn new(
        utc_offset_hours: i32,
        active_from_hour: u32,
        active_until_hour: u32,
    ) -> anyhow::Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * SECS_PER_HOUR).ok_or_else(|| {
            anyhow::anyhow!("utc offset out of range: {} hours", utc_offset_hours)
        })?;
        Ok(Self {
            offset,
            active_from_hour,
            active_until_hour,
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> anyhow::Result<Self> {
        Self::new(
            config.utc_offset_hours,
            config.active_from_hour,
            config.active_until_hour,
        )
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn to_local(&self, utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        utc.with_timezone(&self.offset)
    }

    /// Deny when `hour < from || hour >= until`. With the default window the upper
    /// bound (24) can never match since hours run 0..=23, so only 00:00-05:59 is denied.
    pub fn allows(&self, local: &DateTime<FixedOffset>) -> bool {
        let hour = local.hour();
        !(hour < self.active_from_hour || hour >= self.active_until_hour)
    }
}

/// Row key for a cycle: RFC 3339 local timestamp with offset, e.g. `2024-01-01T06:00:00+08:00`.
/// Sub-second precision is microseconds, written as six digits when non-zero.
pub fn row_key(local: &DateTime<FixedOffset>) -> String {
    let local = local.trunc_subsecs(6);
    let format = if local.nanosecond() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    local.to_rfc3339_opts(format, false)
}

/// Weather `date_time` parameter: local wall-clock time without offset.
pub fn weather_date_time(local: &DateTime<FixedOffset>) -> String {
    local.format("%Y-%m-%dT%H:%M:%S").to_string()
}

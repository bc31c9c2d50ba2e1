//! Per-channel posting windows and daily upload quotas.
//!
//! Day boundaries for the counters come from the tracker's own clock and
//! timezone, not from each channel's posting timezone. A channel whose window
//! is in `America/New_York` while the tracker runs in UTC rolls over to a fresh
//! count at UTC midnight. This asymmetry is kept on purpose; see DESIGN.md.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, warn};

use crate::channel::ChannelTarget;
use crate::error::StoreError;
use crate::store::CounterStore;

/// Upper bound on the days [`UploadTracker::history`] reports.
pub const MAX_HISTORY_DAYS: u32 = 3650;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, settable from tests.
#[derive(Debug)]
pub struct FixedClock(parking_lot::Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(parking_lot::Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.0.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

pub struct UploadTracker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    storage_tz: Tz,
}

impl UploadTracker {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, storage_tz: Tz) -> Self {
        Self {
            store,
            clock,
            storage_tz,
        }
    }

    /// Calendar date used for counter keys, in the tracker's timezone.
    pub fn storage_date(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.storage_tz).date_naive()
    }

    fn key(channel: &str, date: NaiveDate) -> String {
        format!("uploads_{channel}_{}", date.format("%Y-%m-%d"))
    }

    /// Whether `channel` may receive an upload right now. Fails closed: no
    /// window, outside the window, quota reached or a storage error all
    /// answer `false`.
    pub fn should_post_now(&self, channel: &ChannelTarget) -> bool {
        let Some(window) = &channel.window else {
            debug!(channel = %channel.key, "No posting window configured");
            return false;
        };

        let hour = self.clock.now().with_timezone(&window.timezone).hour();
        if !window.contains_hour(hour) {
            debug!(
                channel = %channel.key,
                hour,
                start = window.start_hour,
                end = window.end_hour,
                "Outside posting window"
            );
            return false;
        }

        match self.uploads_today(&channel.key) {
            Ok(count) if count < window.daily_quota => true,
            Ok(count) => {
                debug!(channel = %channel.key, count, quota = window.daily_quota, "Daily quota reached");
                false
            }
            Err(e) => {
                error!(channel = %channel.key, error = %e, "Cannot read upload counter");
                false
            }
        }
    }

    pub fn uploads_today(&self, channel: &str) -> Result<u32, StoreError> {
        self.store.get(&Self::key(channel, self.storage_date()))
    }

    /// Count one confirmed upload. Not idempotent: every call increments.
    pub fn record_upload(&self, channel: &str) -> Result<u32, StoreError> {
        self.store.increment(&Self::key(channel, self.storage_date()))
    }

    /// The last `days` dates, oldest first, with zero for missing records.
    /// `days` is capped at [`MAX_HISTORY_DAYS`].
    pub fn history(&self, channel: &str, days: u32) -> Vec<(NaiveDate, u32)> {
        let today = self.storage_date();
        let prefix = format!("uploads_{channel}_");
        let recorded: HashMap<NaiveDate, u32> = match self.store.enumerate(&prefix) {
            Ok(counters) => counters
                .into_iter()
                .filter_map(|(key, count)| {
                    let date = NaiveDate::parse_from_str(&key[prefix.len()..], "%Y-%m-%d").ok()?;
                    Some((date, count))
                })
                .collect(),
            Err(e) => {
                warn!(channel, error = %e, "Cannot list upload counters, reporting zeros");
                HashMap::new()
            }
        };

        (0..i64::from(days.min(MAX_HISTORY_DAYS)))
            .rev()
            .map(|offset| {
                let date = today - Duration::days(offset);
                (date, recorded.get(&date).copied().unwrap_or(0))
            })
            .collect()
    }
}

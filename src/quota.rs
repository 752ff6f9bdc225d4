//! Daily Neviweb request counter.
//!
//! The client records every HTTP request here; the request-quota sensor only
//! reads it through [`RequestQuotaSource`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::cell::Cell;

/// Neviweb's documented daily request ceiling.
pub const DAILY_REQUEST_LIMIT: u64 = 30_000;

/// Count above which a warning notification is sent.
pub const DAILY_REQUEST_WARNING: u64 = 25_000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct RequestQuota {
    pub count: u64,
    pub date: NaiveDate,
}

pub trait RequestQuotaSource {
    fn current(&self) -> RequestQuota;
}

#[derive(Debug)]
pub struct RequestCounter {
    quota: Cell<RequestQuota>,
}

impl RequestCounter {
    pub fn new(now: DateTime<Utc>) -> Self {
        RequestCounter {
            quota: Cell::new(RequestQuota {
                count: 0,
                date: now.date_naive(),
            }),
        }
    }

    /// Count one request made at `now`, starting over when the UTC date changed.
    pub fn record(&self, now: DateTime<Utc>) {
        let today = now.date_naive();
        let mut q = self.quota.get();
        if q.date != today {
            q = RequestQuota { count: 0, date: today };
        }
        q.count += 1;
        self.quota.set(q);
    }
}

impl RequestQuotaSource for RequestCounter {
    fn current(&self) -> RequestQuota {
        self.quota.get()
    }
}

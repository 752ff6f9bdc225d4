//! Account-wide daily request counter with a once-per-day warning.
//!
//! The count is read when this sensor is polled, so it includes only the
//! requests made by entities polled before it.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::Serialize;
use std::rc::Rc;

use super::{DOMAIN, SensorDescriptor};
use crate::notify::{Notification, Notifier};
use crate::quota::{DAILY_REQUEST_LIMIT, DAILY_REQUEST_WARNING, RequestQuotaSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestQuotaState {
    pub count: u64,
    pub date: NaiveDate,
    pub notified: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum QuotaPollOutcome {
    BelowThreshold,
    Notified,
    AlreadyNotified,
}

pub struct DailyRequestSensor {
    descriptor: SensorDescriptor,
    source: Rc<dyn RequestQuotaSource>,
    notifier: Box<dyn Notifier>,
    state: RequestQuotaState,
}

impl DailyRequestSensor {
    pub fn new(source: Rc<dyn RequestQuotaSource>, notifier: Box<dyn Notifier>) -> Self {
        let mut descriptor = SensorDescriptor::new(format!("{}_daily_requests", DOMAIN), "Neviweb Daily Requests");
        descriptor.icon = Some("mdi:counter");
        let quota = source.current();
        DailyRequestSensor {
            descriptor,
            source,
            notifier,
            state: RequestQuotaState {
                count: quota.count,
                date: quota.date,
                notified: false,
            },
        }
    }

    pub fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut SensorDescriptor {
        &mut self.descriptor
    }

    pub fn state(&self) -> &RequestQuotaState {
        &self.state
    }

    pub fn limit(&self) -> u64 {
        DAILY_REQUEST_LIMIT
    }

    pub fn update(&mut self) -> QuotaPollOutcome {
        let quota = self.source.current();
        if quota.date != self.state.date {
            debug!("Request counter moved to {}; re-arming warning", quota.date);
            self.state.notified = false;
        }
        self.state.count = quota.count;
        self.state.date = quota.date;

        if quota.count <= DAILY_REQUEST_WARNING {
            return QuotaPollOutcome::BelowThreshold;
        }
        if self.state.notified {
            return QuotaPollOutcome::AlreadyNotified;
        }

        self.state.notified = true;
        warn!("Neviweb daily requests at {} (limit {})", quota.count, DAILY_REQUEST_LIMIT);
        self.notifier.notify(Notification {
            title: "Neviweb".to_string(),
            message: format!("Warning : {} today request. Limit : {}.", quota.count, DAILY_REQUEST_LIMIT),
        });
        QuotaPollOutcome::Notified
    }
}

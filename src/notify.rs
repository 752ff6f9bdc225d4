//! Fire-and-forget user notifications.
//!
//! Sensors hand a [`Notification`] to a [`Notifier`] and move on. The channel
//! implementation is drained by a worker thread spawned in `main`.

use crossbeam_channel::{Receiver, Sender};
use log::{debug, warn};
use serde::Serialize;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

pub trait Notifier {
    /// Must not block the caller. Delivery failures are the notifier's problem.
    fn notify(&self, notification: Notification);
}

pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (ChannelNotifier { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.send(notification) {
            warn!("Notification dropped, no consumer: {:?}", e.into_inner());
        }
    }
}

/// Log every notification at warn level until all senders are gone.
pub fn spawn_log_worker(rx: Receiver<Notification>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new().name("notifications".into()).spawn(move || {
        for n in rx {
            warn!("[{}] {}", n.title, n.message);
        }
        debug!("Notification channel closed");
    })
}

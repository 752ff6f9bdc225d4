use crate::services::platform::Platform;
use chrono::Utc;
use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// Poll every entity once per `interval`, forever.
pub fn run_loop(platform: &mut Platform, interval: Duration) -> Result<(), String> {
    loop {
        let tick_start = Instant::now();
        tick(platform);

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        } else {
            warn!(
                "Poll took {:.1}s, longer than the {}s interval",
                elapsed.as_secs_f64(),
                interval.as_secs()
            );
        }
    }
}

fn tick(platform: &mut Platform) {
    let summary = platform.poll_all(Utc::now());
    if summary.failed > 0 {
        info!("Polled {} entities, {} failed", summary.polled, summary.failed);
    } else {
        debug!("Polled {} entities", summary.polled);
    }

    for snapshot in platform.snapshots() {
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!("state {}", json),
            Err(e) => warn!("could not serialize entity state: {}", e),
        }
    }
}

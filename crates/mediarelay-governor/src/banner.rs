//! Countdown banner over the throttle mirror.

use tokio::sync::watch;
use tokio::time::{self, Duration, MissedTickBehavior};

use crate::Governor;

/// How often the banner re-reads the mirror.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerState {
    pub seconds_left: u64,
    pub text: String,
}

/// Passive reader of the governor's rate-limit window.
#[derive(Clone)]
pub struct RateLimitBanner {
    governor: Governor,
}

impl RateLimitBanner {
    pub fn new(governor: Governor) -> Self {
        Self { governor }
    }

    /// Banner contents, or `None` when nothing should be shown.
    pub fn poll(&self) -> Option<BannerState> {
        let status = self.governor.is_rate_limited();
        if !status.limited || status.remaining_secs == 0 {
            return None;
        }
        Some(BannerState {
            seconds_left: status.remaining_secs,
            text: format!(
                "Upstream bandwidth limit reached. Images will be available in {}",
                format_countdown(status.remaining_secs)
            ),
        })
    }

    /// Publish the banner every [`POLL_INTERVAL`] until every receiver is gone.
    pub async fn run(self, tx: watch::Sender<Option<BannerState>>) {
        let mut ticker = time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }

            let next = self.poll();
            tx.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });
        }
        tracing::debug!("Rate-limit banner stopped");
    }
}

/// `"1h 2m 3s"`, `"2m 5s"`, or `"9s"`.
pub fn format_countdown(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(3723), "1h 2m 3s");
        assert_eq!(format_countdown(3600), "1h 0m 0s");
        assert_eq!(format_countdown(125), "2m 5s");
        assert_eq!(format_countdown(9), "9s");
        assert_eq!(format_countdown(0), "0s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_tracks_mirror() {
        let governor = Governor::default();
        let banner = RateLimitBanner::new(governor.clone());
        assert_eq!(banner.poll(), None);

        governor.set_rate_limited(125);
        let state = banner.poll().unwrap();
        assert_eq!(state.seconds_left, 125);
        assert!(state.text.ends_with("available in 2m 5s"));

        time::advance(Duration::from_secs(125)).await;
        assert_eq!(banner.poll(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_counts_down_and_stops() {
        let governor = Governor::default();
        governor.set_rate_limited(2);

        let (tx, mut rx) = watch::channel(None);
        let task = tokio::spawn(RateLimitBanner::new(governor).run(tx));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().seconds_left, 2);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref().unwrap().seconds_left, 1);

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_none());

        drop(rx);
        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("banner task should exit")
            .unwrap();
    }
}

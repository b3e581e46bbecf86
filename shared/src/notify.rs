//! Guardian notification fan-out.

use crate::email::{alert_email, Mailer};
use crate::types::{AlertStatus, Guardian, Location};

/// What every guardian is told about the alert.
#[derive(Debug, Clone)]
pub struct AlertContext {
    pub detection_type: String,
    pub location: Location,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSummary {
    pub notified: u32,
    pub total: u32,
    pub status: AlertStatus,
}

/// Overall outcome of a fan-out. A single success among failures is
/// `Partial`; only zero successes is `Failed`.
pub fn aggregate_status(notified: u32, total: u32) -> AlertStatus {
    if total == 0 {
        AlertStatus::NoGuardians
    } else if notified == 0 {
        AlertStatus::Failed
    } else if notified < total {
        AlertStatus::Partial
    } else {
        AlertStatus::Delivered
    }
}

/// Email every guardian in turn. A failed send never stops the rest; sends are
/// sequential and unbounded in time, so a slow provider delays the caller.
pub async fn notify_all(
    mailer: &dyn Mailer,
    guardians: &[Guardian],
    context: &AlertContext,
) -> FanOutSummary {
    let mut notified = 0;

    for guardian in guardians {
        let message = alert_email(
            &guardian.email,
            &guardian.name,
            &context.detection_type,
            &context.location,
            &context.timestamp,
        );

        match mailer.send(&message).await {
            outcome if outcome.is_delivered() => notified += 1,
            outcome => {
                tracing::warn!(
                    guardian_id = %guardian.id,
                    outcome = ?outcome,
                    "Guardian notification failed"
                );
            }
        }
    }

    let total = guardians.len() as u32;
    FanOutSummary {
        notified,
        total,
        status: aggregate_status(notified, total),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::email::{EmailMessage, Mailer, SendOutcome};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every message; addresses in `failing` are refused.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub failing: HashSet<String>,
        pub sent: Mutex<Vec<EmailMessage>>,
    }

    impl RecordingMailer {
        pub fn failing(addresses: &[&str]) -> Self {
            Self {
                failing: addresses.iter().map(|a| a.to_string()).collect(),
                sent: Mutex::new(Vec::new()),
            }
        }

        pub fn attempts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|m| m.to.clone()).collect()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> SendOutcome {
            self.sent.lock().unwrap().push(message.clone());
            if self.failing.contains(&message.to) {
                SendOutcome::Failed {
                    error_code: "MessageRejected".to_string(),
                }
            } else {
                SendOutcome::Delivered {
                    message_id: format!("msg-{}", message.to),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingMailer;
    use super::*;
    use crate::email::{EmailMessage, SendOutcome};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::Instant;

    fn guardians(n: usize) -> Vec<Guardian> {
        (0..n)
            .map(|i| Guardian {
                id: format!("g{}", i),
                user_id: "alice".to_string(),
                name: format!("Guardian {}", i),
                email: format!("g{}@example.com", i),
                phone: String::new(),
                relationship: String::new(),
            })
            .collect()
    }

    fn context() -> AlertContext {
        AlertContext {
            detection_type: "voice_distress".to_string(),
            location: Location { lat: 12.97, lng: 77.59 },
            timestamp: "2026-10-19T08:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_aggregate_status_rule() {
        assert_eq!(aggregate_status(0, 0), AlertStatus::NoGuardians);
        assert_eq!(aggregate_status(0, 3), AlertStatus::Failed);
        assert_eq!(aggregate_status(1, 3), AlertStatus::Partial);
        assert_eq!(aggregate_status(2, 3), AlertStatus::Partial);
        assert_eq!(aggregate_status(3, 3), AlertStatus::Delivered);
    }

    #[tokio::test]
    async fn test_all_sends_succeed() {
        let expected = [
            AlertStatus::NoGuardians,
            AlertStatus::Delivered,
            AlertStatus::Delivered,
            AlertStatus::Delivered,
        ];
        for (n, status) in expected.into_iter().enumerate() {
            let mailer = RecordingMailer::default();
            let summary = notify_all(&mailer, &guardians(n), &context()).await;
            assert_eq!(summary.status, status, "{} guardians", n);
            assert_eq!(summary.notified as usize, n);
            assert_eq!(summary.total as usize, n);
        }
    }

    #[tokio::test]
    async fn test_one_of_three_is_partial() {
        let mailer = RecordingMailer::failing(&["g0@example.com", "g2@example.com"]);
        let summary = notify_all(&mailer, &guardians(3), &context()).await;
        assert_eq!(summary.status, AlertStatus::Partial);
        assert_eq!(summary.notified, 1);
    }

    #[tokio::test]
    async fn test_all_failed_still_attempts_everyone() {
        let mailer =
            RecordingMailer::failing(&["g0@example.com", "g1@example.com", "g2@example.com"]);
        let summary = notify_all(&mailer, &guardians(3), &context()).await;
        assert_eq!(summary.status, AlertStatus::Failed);
        assert_eq!(summary.notified, 0);
        assert_eq!(
            mailer.attempts(),
            vec!["g0@example.com", "g1@example.com", "g2@example.com"]
        );
    }

    /// Takes a fixed time per send.
    struct SlowMailer {
        delay: Duration,
    }

    #[async_trait]
    impl Mailer for SlowMailer {
        async fn send(&self, message: &EmailMessage) -> SendOutcome {
            tokio::time::sleep(self.delay).await;
            SendOutcome::Delivered {
                message_id: format!("msg-{}", message.to),
            }
        }
    }

    // Sends are sequential with no timeout, so a slow provider holds the
    // caller for the sum of all send times.
    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_delays_the_whole_fan_out() {
        let delay = Duration::from_secs(20);
        let mailer = SlowMailer { delay };

        let started = Instant::now();
        let summary = notify_all(&mailer, &guardians(3), &context()).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= delay * 3, "{:?}", elapsed);
        assert!(elapsed < delay * 3 + Duration::from_secs(1), "{:?}", elapsed);
        assert_eq!(summary.notified, 3);
        assert_eq!(summary.status, AlertStatus::Delivered);
    }
}

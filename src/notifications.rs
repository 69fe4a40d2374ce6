//! In-process notification outbox.
//!
//! Status changes and new submissions enqueue an event onto a bounded mpsc
//! channel; a background dispatcher task renders and sends the matching email.
//! The booking flow never waits on delivery and never learns whether it
//! succeeded. Failures are logged and counted, nothing is retried or rolled
//! back. A crash between the store commit and the send drops the notification.

use metrics::counter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::models::battle_requests::{BattleRequest, RequestStatus},
    email::EmailService,
};

/// A notification-worthy fact about a battle request.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A new request was created; the admin gets the accept/reject links.
    RequestSubmitted { request: BattleRequest },
    /// A request reached a terminal status; the requester gets the outcome.
    StatusChanged { request: BattleRequest },
}

impl NotificationEvent {
    fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::RequestSubmitted { .. } => "request_submitted",
            NotificationEvent::StatusChanged { .. } => "status_changed",
        }
    }
}

#[derive(Debug)]
struct Envelope {
    id: Uuid,
    event: NotificationEvent,
}

/// Producer half of the outbox, cloned into application state.
#[derive(Clone)]
pub struct NotificationOutbox {
    tx: mpsc::Sender<Envelope>,
}

impl NotificationOutbox {
    /// Enqueue an event, fire-and-forget. A full or closed channel drops the
    /// event with a warning; the caller's state change stands regardless.
    pub fn enqueue(&self, event: NotificationEvent) {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            event,
        };
        let kind = envelope.event.kind();

        match self.tx.try_send(envelope) {
            Ok(()) => {
                counter!("battlectl_notifications_enqueued_total", "kind" => kind).increment(1);
            }
            Err(e) => {
                counter!("battlectl_notifications_dropped_total", "kind" => kind).increment(1);
                tracing::warn!(kind, "Failed to enqueue notification, dropping event: {}", e);
            }
        }
    }
}

/// Spawn the dispatcher task and return the outbox plus its join handle.
pub fn spawn_dispatcher(
    email_service: EmailService,
    admin_email: String,
    channel_capacity: usize,
    shutdown: CancellationToken,
) -> (NotificationOutbox, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let handle = tokio::spawn(run_dispatcher(rx, email_service, admin_email, shutdown));
    (NotificationOutbox { tx }, handle)
}

/// Long-lived task that receives events and performs email delivery.
async fn run_dispatcher(
    mut rx: mpsc::Receiver<Envelope>,
    email_service: EmailService,
    admin_email: String,
    shutdown: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            envelope = rx.recv() => {
                match envelope {
                    Some(envelope) => envelope,
                    None => {
                        tracing::debug!("Notification channel closed, shutting down dispatcher");
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("Notification dispatcher received shutdown signal");
                break;
            }
        };

        deliver(&email_service, &admin_email, envelope).await;
    }

    tracing::debug!("Notification dispatcher exited");
}

async fn deliver(email_service: &EmailService, admin_email: &str, envelope: Envelope) {
    let kind = envelope.event.kind();

    let result = match &envelope.event {
        NotificationEvent::RequestSubmitted { request } => email_service.send_request_received_email(admin_email, request).await,
        NotificationEvent::StatusChanged { request } => match request.status {
            RequestStatus::Confirmed => email_service.send_confirmation_email(request).await,
            RequestStatus::Rejected => email_service.send_rejection_email(request).await,
            RequestStatus::Pending => {
                // Status changes only ever move to a terminal state.
                tracing::warn!(event_id = %envelope.id, "Ignoring status-changed event for pending request");
                return;
            }
        },
    };

    match result {
        Ok(()) => {
            counter!("battlectl_notifications_sent_total", "kind" => kind, "outcome" => "success").increment(1);
            tracing::info!(event_id = %envelope.id, kind, "Notification email sent");
        }
        Err(e) => {
            counter!("battlectl_notifications_sent_total", "kind" => kind, "outcome" => "failure").increment(1);
            tracing::warn!(event_id = %envelope.id, kind, error = %e, "Failed to send notification email");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::battle_requests::RequestStatus;
    use crate::test_utils::create_test_config_with_email_dir;
    use chrono::{NaiveDate, Utc};
    use std::time::Duration;

    fn test_request(status: RequestStatus) -> BattleRequest {
        BattleRequest {
            id: 7,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            twitch_username: "ada_plays".to_string(),
            game: "Street Fighter 6".to_string(),
            notes: None,
            requested_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            requested_time: "5:00 PM".to_string(),
            status,
            token: "brq-outbox-test".to_string(),
            created_at: Utc::now(),
        }
    }

    /// Wait until the email directory holds at least `count` files, returning
    /// their contents with quoted-printable soft line breaks removed.
    async fn wait_for_emails(dir: &std::path::Path, count: usize) -> Vec<String> {
        for _ in 0..50 {
            let contents: Vec<String> = std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .filter_map(|e| std::fs::read_to_string(e.path()).ok())
                        .map(|raw| raw.replace("=\r\n", "").replace("=\n", ""))
                        .collect()
                })
                .unwrap_or_default();
            if contents.len() >= count {
                return contents;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Expected {count} emails to be written");
    }

    #[tokio::test]
    async fn submitted_event_emails_admin_with_magic_links() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config_with_email_dir(dir.path());
        let email_service = EmailService::new(&config).unwrap();
        let shutdown = CancellationToken::new();

        let (outbox, handle) = spawn_dispatcher(email_service, config.admin_email.clone(), 16, shutdown.clone());

        outbox.enqueue(NotificationEvent::RequestSubmitted {
            request: test_request(RequestStatus::Pending),
        });

        let emails = wait_for_emails(dir.path(), 1).await;
        assert!(emails.iter().any(|e| e.contains("action=3Daccept") || e.contains("action=accept")));

        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn status_changed_event_emails_requester() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config_with_email_dir(dir.path());
        let email_service = EmailService::new(&config).unwrap();
        let shutdown = CancellationToken::new();

        let (outbox, handle) = spawn_dispatcher(email_service, config.admin_email.clone(), 16, shutdown.clone());

        outbox.enqueue(NotificationEvent::StatusChanged {
            request: test_request(RequestStatus::Confirmed),
        });
        outbox.enqueue(NotificationEvent::StatusChanged {
            request: test_request(RequestStatus::Rejected),
        });

        let emails = wait_for_emails(dir.path(), 2).await;
        assert!(emails.iter().any(|e| e.contains("confirmed")));
        assert!(emails.iter().any(|e| e.contains("ada@example.com")));

        shutdown.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn enqueue_on_closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let outbox = NotificationOutbox { tx };

        // Channel is closed; the event is dropped with a warning.
        outbox.enqueue(NotificationEvent::RequestSubmitted {
            request: test_request(RequestStatus::Pending),
        });
    }
}

//! Notification collaborator.
//!
//! Notifications are fire-and-forget: [`spawn_notification`] runs the delivery on its
//! own task and turns every failure (including a panic in the notifier) into a log
//! entry. Nothing in the pipeline can fail because a notification failed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use lumen_core::models::NewNotification;
use tokio::task::JoinHandle;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn create(&self, notification: NewNotification) -> anyhow::Result<()>;
}

/// Deliver a notification on a separate task. Await the handle to wait for the attempt;
/// the handle never yields an error worth acting on.
pub fn spawn_notification(
    notifier: Arc<dyn Notifier>,
    notification: NewNotification,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let recipient = notification.recipient;
        let kind = notification.notification_type.as_str();
        match notifier.create(notification).await {
            Ok(()) => {
                tracing::debug!(recipient = %recipient, notification_type = kind, "Notification created");
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    recipient = %recipient,
                    notification_type = kind,
                    "Failed to create notification"
                );
            }
        }
    })
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn create(&self, notification: NewNotification) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            notification_type = notification.notification_type.as_str(),
            metadata = %notification.metadata,
            "Notification"
        );
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Default)]
pub struct InMemoryNotifier {
    sent: Mutex<Vec<NewNotification>>,
    fail: AtomicBool,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<NewNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn create(&self, notification: NewNotification) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("notification service unavailable");
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct PanickingNotifier;

    #[async_trait]
    impl Notifier for PanickingNotifier {
        async fn create(&self, _notification: NewNotification) -> anyhow::Result<()> {
            panic!("notifier bug");
        }
    }

    #[tokio::test]
    async fn delivered_notification_is_recorded() {
        let notifier = Arc::new(InMemoryNotifier::new());
        let n = NewNotification::upload_completed(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        spawn_notification(notifier.clone(), n).await.unwrap();
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn failures_do_not_escape() {
        let notifier = Arc::new(InMemoryNotifier::new());
        notifier.fail_all(true);
        let n = NewNotification::upload_completed(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(spawn_notification(notifier.clone(), n).await.is_ok());
        assert!(notifier.sent().is_empty());

        let n = NewNotification::upload_completed(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // A panicking notifier only poisons its own task
        assert!(spawn_notification(Arc::new(PanickingNotifier), n).await.is_err());
    }
}

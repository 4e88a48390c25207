use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    UploadCompleted,
    UploadFailed,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::UploadCompleted => "upload_completed",
            NotificationType::UploadFailed => "upload_failed",
        }
    }
}

/// Message handed to the notification system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub metadata: serde_json::Value,
}

impl NewNotification {
    pub fn upload_completed(recipient: Uuid, upload_id: Uuid, record_id: Uuid) -> Self {
        Self {
            recipient,
            notification_type: NotificationType::UploadCompleted,
            metadata: serde_json::json!({
                "upload_id": upload_id,
                "record_id": record_id,
            }),
        }
    }

    pub fn upload_failed(recipient: Uuid, upload_id: Uuid, reason: &str, error_code: &str) -> Self {
        Self {
            recipient,
            notification_type: NotificationType::UploadFailed,
            metadata: serde_json::json!({
                "upload_id": upload_id,
                "reason": reason,
                "error_code": error_code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_notification_carries_reason() {
        let n = NewNotification::upload_failed(
            Uuid::nil(),
            Uuid::nil(),
            "corrupt",
            "FATAL_INPUT_ERROR",
        );
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "upload_failed");
        assert_eq!(json["metadata"]["reason"], "corrupt");
    }
}

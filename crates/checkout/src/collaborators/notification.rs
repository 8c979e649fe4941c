use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::CollaboratorError;

/// Fire-and-forget customer notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        user_id: UserId,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentNotification {
    pub user_id: UserId,
    pub template: String,
    pub data: serde_json::Value,
}

#[derive(Default)]
struct NotifierState {
    sent: Vec<SentNotification>,
    fail: bool,
}

/// Records notifications instead of sending them.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<NotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentNotification> {
        self.state.read().await.sent.clone()
    }

    /// Configures the notifier to fail every send.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(
        &self,
        user_id: UserId,
        template: &str,
        data: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(CollaboratorError::Unavailable(
                "mail relay unreachable".to_string(),
            ));
        }
        state.sent.push(SentNotification {
            user_id,
            template: template.to_string(),
            data,
        });
        Ok(())
    }
}

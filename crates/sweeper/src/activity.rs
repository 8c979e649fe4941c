use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use checkout::CollaboratorError;
use common::UserId;
use tokio::sync::RwLock;

/// When users were last seen, used to decide how often their carts are swept.
#[async_trait]
pub trait UserActivity: Send + Sync {
    async fn last_active_at(&self, user_id: UserId)
    -> Result<Option<DateTime<Utc>>, CollaboratorError>;
}

#[derive(Clone, Default)]
pub struct InMemoryUserActivity {
    seen: Arc<RwLock<HashMap<UserId, DateTime<Utc>>>>,
}

impl InMemoryUserActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, user_id: UserId, at: DateTime<Utc>) {
        self.seen.write().await.insert(user_id, at);
    }
}

#[async_trait]
impl UserActivity for InMemoryUserActivity {
    async fn last_active_at(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, CollaboratorError> {
        Ok(self.seen.read().await.get(&user_id).copied())
    }
}

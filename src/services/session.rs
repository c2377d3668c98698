//! Session manager.
//!
//! Sessions are opaque bearer tokens bound to a user. There is no
//! refresh: clients re-authenticate when a session expires. Expired
//! rows are swept by the reaper.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::models::{Principal, Session};
use crate::store::{Clock, SessionStore, UserStore};

pub struct SessionService {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            users,
            clock,
            ttl,
        }
    }

    pub async fn create(&self, principal: &Principal) -> Result<Session, ServiceError> {
        if !principal.is_user() {
            return Err(ServiceError::InvalidArgument(
                "sessions are only issued to users".to_string(),
            ));
        }
        let user_id = Uuid::parse_str(&principal.id)
            .map_err(|_| ServiceError::InvalidArgument("malformed principal id".to_string()))?;

        let session = Session::new(user_id, self.ttl, self.clock.now());
        let session = self.store.insert(session).await?;
        tracing::info!(user_id = %user_id, "session created");
        Ok(session)
    }

    /// Missing, expired or disabled-user sessions are all invalid; the
    /// caller cannot distinguish them.
    pub async fn validate(&self, id: Uuid) -> Result<Session, ServiceError> {
        let invalid = || ServiceError::Unauthenticated("invalid session".to_string());

        let session = self.store.get(id).await?.ok_or_else(invalid)?;
        if !session.is_valid(self.clock.now()) {
            return Err(invalid());
        }
        let user = self.users.get(session.user_id).await?.ok_or_else(invalid)?;
        if !user.is_enabled() {
            return Err(invalid());
        }
        Ok(session)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.store.delete(id).await?;
        Ok(())
    }
}

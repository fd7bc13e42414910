use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{CredentialStore, UserCredential, UserId};

/// Process-local store, lost on restart.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    rows: Mutex<HashMap<UserId, UserCredential>>,
}

impl InMemoryCredentialStore {
    fn rows(&self) -> MutexGuard<'_, HashMap<UserId, UserCredential>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows().len()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn upsert(&self, credential: &UserCredential) -> Result<()> {
        self.rows()
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }

    fn get(&self, user_id: &str) -> Result<Option<UserCredential>> {
        Ok(self.rows().get(user_id).cloned())
    }

    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rows = self.rows();
        let Some(row) = rows.get_mut(user_id) else {
            return Ok(false);
        };
        row.access_token = access_token.to_string();
        if let Some(refresh_token) = refresh_token {
            row.refresh_token = refresh_token.to_string();
        }
        row.expires_at = expires_at;
        Ok(true)
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.rows().remove(user_id).is_some())
    }
}

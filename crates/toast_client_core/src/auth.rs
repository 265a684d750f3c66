//! Auth collaborator seam: caller identity and a fresh, revocable token.
//! `SessionAuth` keeps the session in the local config table, like the rest of the client state.

use crate::error::{CoreError, Result};
use crate::storage::LocalStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const KEY_TOKEN: &str = "token";
const KEY_USER_ID: &str = "user_id";
const KEY_EXPIRES_AT: &str = "token_expires_at";
const KEY_DISPLAY_NAME: &str = "display_name";
const KEY_EMAIL: &str = "email";

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub String);

impl AccessToken {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

pub trait AuthProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;

    /// A non-expired credential, or `CoreError::Auth` if the session is invalid.
    fn fresh_token(&self) -> Result<AccessToken>;

    /// Name shown to other guests. Hosts that have none fall back to "Anonymous".
    fn display_name(&self) -> Option<String> {
        None
    }

    /// Owner address stamped on created events.
    fn email(&self) -> Option<String> {
        None
    }
}

pub struct SessionAuth {
    store: Arc<LocalStore>,
}

impl SessionAuth {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Store the session handed over by the sign-in flow. `expires_at: None` never expires.
    pub fn sign_in(&self, user_id: &str, token: &str, expires_at: Option<DateTime<Utc>>) -> Result<()> {
        self.store.config_set(KEY_USER_ID, user_id)?;
        self.store.config_set(KEY_TOKEN, token)?;
        match expires_at {
            Some(at) => self.store.config_set(KEY_EXPIRES_AT, &at.to_rfc3339())?,
            None => self.store.config_remove(KEY_EXPIRES_AT)?,
        }
        Ok(())
    }

    /// Profile fields from the sign-in provider. `None` clears the field.
    pub fn set_profile(&self, display_name: Option<&str>, email: Option<&str>) -> Result<()> {
        for (key, value) in [(KEY_DISPLAY_NAME, display_name), (KEY_EMAIL, email)] {
            match value {
                Some(v) => self.store.config_set(key, v)?,
                None => self.store.config_remove(key)?,
            }
        }
        Ok(())
    }

    /// Revoke: the next `fresh_token` fails.
    pub fn sign_out(&self) -> Result<()> {
        for key in [KEY_TOKEN, KEY_USER_ID, KEY_EXPIRES_AT, KEY_DISPLAY_NAME, KEY_EMAIL] {
            self.store.config_remove(key)?;
        }
        Ok(())
    }

    pub fn is_signed_in(&self) -> bool {
        self.fresh_token().is_ok()
    }
}

impl AuthProvider for SessionAuth {
    fn current_user_id(&self) -> Option<String> {
        self.store.config_get(KEY_USER_ID).ok().flatten()
    }

    fn display_name(&self) -> Option<String> {
        self.store.config_get(KEY_DISPLAY_NAME).ok().flatten()
    }

    fn email(&self) -> Option<String> {
        self.store.config_get(KEY_EMAIL).ok().flatten()
    }

    fn fresh_token(&self) -> Result<AccessToken> {
        let token = self
            .store
            .config_get(KEY_TOKEN)
            .map_err(|e| CoreError::Auth(e.to_string()))?
            .ok_or_else(|| CoreError::Auth("Not signed in".to_string()))?;
        let expires_at = self
            .store
            .config_get(KEY_EXPIRES_AT)
            .map_err(|e| CoreError::Auth(e.to_string()))?;
        if let Some(raw) = expires_at {
            let at = DateTime::parse_from_rfc3339(&raw)
                .map_err(|e| CoreError::Auth(format!("bad token expiry: {}", e)))?;
            if at.with_timezone(&Utc) <= Utc::now() {
                return Err(CoreError::Auth("Session expired".to_string()));
            }
        }
        Ok(AccessToken(token))
    }
}

//! Minimal signed-in identity holder

use parking_lot::RwLock;
use podium_store::{AuthApi, UserId};
use tracing::info;

/// Holds the signed-in user for whatever drives the login flow.
/// A session reads it before every intent.
#[derive(Default)]
pub struct SessionAuth {
    current: RwLock<Option<UserId>>,
}

impl SessionAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserId) -> Self {
        Self {
            current: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        info!("Signed in as {}", user);
        *self.current.write() = Some(user);
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.current.write().take() {
            info!("Signed out {}", user);
        }
    }
}

impl AuthApi for SessionAuth {
    fn current_user_id(&self) -> Option<UserId> {
        self.current.read().clone()
    }
}

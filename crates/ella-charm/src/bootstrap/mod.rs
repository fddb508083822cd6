//! First-run admin account bootstrap
//!
//! A fresh Ella Core has no users. The charm creates one admin account for
//! itself and keeps the credential in a Juju secret. The secret is written
//! before the account is created: a crash in between leaves a stored
//! credential and an uninitialized application, so the next hook simply
//! runs the bootstrap again.

use std::collections::BTreeMap;
use std::fmt;

use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use tracing::info;

use crate::core_api::{CoreApi, CoreStatus, NewUser, ROLE_ADMIN};
use crate::host::HostRuntime;
use crate::Error;

/// Email of the charm's own admin account
pub const CHARM_USER_EMAIL: &str = "charm@ellanetworks.com";

/// Label of the secret holding the admin credential
pub const LOGIN_SECRET_LABEL: &str = "ELLA_CORE_LOGIN";

/// Length of generated passwords
pub const PASSWORD_LENGTH: usize = 16;

/// Result of [`ensure_admin`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The application already had users; nothing was done
    AlreadyInitialized,
    /// A credential was stored and the admin account created
    AdminCreated {
        /// ID of the secret holding the credential
        secret_id: String,
    },
}

/// Login for the charm's admin account
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredential {
    email: String,
    password: String,
}

impl AdminCredential {
    /// Generate a credential with a random alphanumeric password
    pub fn generate() -> Self {
        Self {
            email: CHARM_USER_EMAIL.to_string(),
            password: Alphanumeric.sample_string(&mut OsRng, PASSWORD_LENGTH),
        }
    }

    /// Account email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Account password
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Secret content as stored in Juju
    pub fn secret_content(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("email".to_string(), self.email.clone()),
            ("password".to_string(), self.password.clone()),
        ])
    }

    /// User creation request granting the admin role
    pub fn admin_user(&self) -> NewUser {
        NewUser {
            email: self.email.clone(),
            password: self.password.clone(),
            role_id: ROLE_ADMIN,
        }
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Create the admin account unless the application is already initialized
///
/// `status` is the result of the probe the controller just ran; the
/// `initialized` flag is authoritative, so a rerun never creates a second
/// account.
pub async fn ensure_admin(
    api: &dyn CoreApi,
    host: &dyn HostRuntime,
    status: &CoreStatus,
) -> Result<BootstrapOutcome, Error> {
    if status.initialized {
        return Ok(BootstrapOutcome::AlreadyInitialized);
    }

    info!("application is not initialized, creating admin account");
    let credential = AdminCredential::generate();

    let secret_id = host
        .add_secret(LOGIN_SECRET_LABEL, &credential.secret_content())
        .await
        .map_err(|e| e.in_step("store admin credential"))?;

    api.create_user(&credential.admin_user())
        .await
        .map_err(|e| e.in_step("create admin account"))?;

    info!(email = credential.email(), secret_id = %secret_id, "admin account created");
    Ok(BootstrapOutcome::AdminCreated { secret_id })
}

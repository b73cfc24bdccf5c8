use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use tracing::{error, info, warn};

use super::repo_types::{NewUser, User};
use crate::{
    config::AdminConfig,
    error::{ParkingError, ParkingResult},
    store::ParkingStore,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Validates and stores a regular (non-admin) account.
pub async fn register(
    store: &dyn ParkingStore,
    email: &str,
    username: &str,
    password: &str,
) -> ParkingResult<User> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ParkingError::InvalidInput("invalid email".into()));
    }
    let username = username.trim();
    if username.is_empty() {
        return Err(ParkingError::InvalidInput("username is required".into()));
    }
    if password.len() < 8 {
        return Err(ParkingError::InvalidInput("password too short".into()));
    }

    let password_hash = hash_password(password)?;
    let user = store
        .insert_user(NewUser {
            email,
            username: username.to_string(),
            password_hash,
            is_admin: false,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Returns the user when email and password match, `None` otherwise.
pub async fn authenticate(
    store: &dyn ParkingStore,
    email: &str,
    password: &str,
) -> ParkingResult<Option<User>> {
    let email = email.trim().to_lowercase();
    let Some(user) = store.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Ok(None);
    };
    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Ok(None);
    }
    Ok(Some(user))
}

/// Creates the configured admin account unless an admin already exists.
pub async fn ensure_admin(store: &dyn ParkingStore, admin: &AdminConfig) -> ParkingResult<bool> {
    if store.has_admin().await? {
        info!("admin already exists");
        return Ok(false);
    }
    let password_hash = hash_password(&admin.password)?;
    let user = store
        .insert_user(NewUser {
            email: admin.email.trim().to_lowercase(),
            username: admin.username.clone(),
            password_hash,
            is_admin: true,
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "admin created");
    Ok(true)
}

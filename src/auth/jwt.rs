use std::time::Duration;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::dto::{Claims, JwtKeys, TokenKind};
use crate::{config::JwtConfig, state::AppState};

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: Uuid, admin: bool, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
            admin,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, admin, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid, admin: bool) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, admin, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        // admin is re-read from the user record on refresh
        self.sign_with_kind(user_id, false, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }
}

/// Identity of the requester, threaded explicitly into every core call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_admin: bool,
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Access token required".to_string(),
            ));
        }

        Ok(Caller {
            user_id: claims.sub,
            is_admin: claims.admin,
        })
    }
}

/// A `Caller` whose token carries the admin flag.
pub struct AdminCaller(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for AdminCaller
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = Caller::from_request_parts(parts, state).await?;
        if !caller.is_admin {
            warn!(user_id = %caller.user_id, "admin route denied");
            return Err((StatusCode::FORBIDDEN, "Admin access required".to_string()));
        }
        Ok(AdminCaller(caller))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake())
    }

    fn parts_with(token: &str) -> Parts {
        let (parts, _) = Request::builder()
            .uri("/")
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {}", token))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn access_token_carries_admin_flag() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let token = keys.sign_access(user_id, true).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.admin);
    }

    #[tokio::test]
    async fn verify_refresh_rejects_access_token() {
        let keys = make_keys();
        let token = keys.sign_access(Uuid::new_v4(), false).expect("sign access");
        let err = keys.verify_refresh(&token).unwrap_err();
        assert!(err.to_string().contains("not a refresh token"));
    }

    #[tokio::test]
    async fn verify_rejects_foreign_audience() {
        let keys = make_keys();
        let mut other = make_keys();
        other.audience = "someone-else".into();
        let token = other.sign_access(Uuid::new_v4(), false).expect("sign access");
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn caller_extracted_from_bearer_token() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let user_id = Uuid::new_v4();
        let mut parts = parts_with(&keys.sign_access(user_id, false).unwrap());

        let caller = Caller::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(
            caller,
            Caller {
                user_id,
                is_admin: false
            }
        );
    }

    #[tokio::test]
    async fn refresh_token_is_not_a_caller() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);
        let mut parts = parts_with(&keys.sign_refresh(Uuid::new_v4()).unwrap());

        let (status, _) = Caller::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_reject_plain_users() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);

        let mut plain = parts_with(&keys.sign_access(Uuid::new_v4(), false).unwrap());
        let (status, _) = AdminCaller::from_request_parts(&mut plain, &state)
            .await
            .err()
            .expect("plain user must be rejected");
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut admin = parts_with(&keys.sign_access(Uuid::new_v4(), true).unwrap());
        let AdminCaller(caller) = AdminCaller::from_request_parts(&mut admin, &state)
            .await
            .ok()
            .expect("admin accepted");
        assert!(caller.is_admin);
    }
}

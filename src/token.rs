//! Access / refresh token service
//!
//! Issues and verifies HS256 JWTs and builds the HTTP-only cookies that carry them.
//! Refresh tokens are persisted only as SHA-256 hashes (see `entity::refresh_token`).

use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::entity::account;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Refresh cookie is only sent to API routes
const REFRESH_COOKIE_PATH: &str = "/api";

/// Token kind, carried in the `kind` claim
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims stored in both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub username: String,
    pub role: String,
    pub kind: TokenKind,
    /// Unique token id, makes every refresh token hash distinct
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

impl Claims {
    pub fn account_id(&self) -> Result<i64, TokenError> {
        self.sub
            .parse()
            .map_err(|_| TokenError::Invalid(format!("bad subject '{}'", self.sub)))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("wrong token kind")]
    WrongKind,

    #[error("refresh token revoked")]
    Revoked,

    #[error("token generation failed: {0}")]
    Generation(String),
}

/// Freshly issued access + refresh tokens
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// Hash to persist for the refresh token
    pub refresh_hash: String,
    pub refresh_expires_at: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
    cookie_secure: bool,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_ttl_secs,
            refresh_ttl: config.refresh_token_ttl_secs,
            cookie_secure: config.cookie_secure,
        }
    }

    /// Issue a new access/refresh pair for the account
    pub fn issue_pair(&self, account: &account::Model) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(account, chrono::Utc::now().timestamp())
    }

    pub(crate) fn issue_pair_at(
        &self,
        account: &account::Model,
        now: i64,
    ) -> Result<TokenPair, TokenError> {
        let access = self.sign(account, TokenKind::Access, now)?;
        let refresh = self.sign(account, TokenKind::Refresh, now)?;
        Ok(TokenPair {
            refresh_hash: hash_refresh(&refresh),
            refresh_expires_at: now + self.refresh_ttl,
            access,
            refresh,
        })
    }

    pub(crate) fn sign(
        &self,
        account: &account::Model,
        kind: TokenKind,
        now: i64,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: account.id.to_string(),
            username: account.username.clone(),
            role: account.role.clone(),
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + ttl,
            iss: self.issuer.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Generation(e.to_string()))
    }

    /// Verify signature, issuer, expiry and kind
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iss"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        if data.claims.kind != kind {
            return Err(TokenError::WrongKind);
        }
        Ok(data.claims)
    }

    pub fn access_cookie(&self, token: String) -> Cookie<'static> {
        self.cookie(ACCESS_COOKIE, token, "/", self.access_ttl)
    }

    pub fn refresh_cookie(&self, token: String) -> Cookie<'static> {
        self.cookie(REFRESH_COOKIE, token, REFRESH_COOKIE_PATH, self.refresh_ttl)
    }

    /// Expired, empty cookies that make the browser drop both tokens
    pub fn clear_cookies(&self) -> [Cookie<'static>; 2] {
        [
            self.cookie(ACCESS_COOKIE, String::new(), "/", 0),
            self.cookie(REFRESH_COOKIE, String::new(), REFRESH_COOKIE_PATH, 0),
        ]
    }

    fn cookie(
        &self,
        name: &'static str,
        value: String,
        path: &'static str,
        max_age_secs: i64,
    ) -> Cookie<'static> {
        Cookie::build((name, value))
            .path(path)
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age_secs))
            .build()
    }
}

/// Hex SHA-256 of a refresh token, the only form that is stored
pub fn hash_refresh(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn test_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            ..AuthConfig::default()
        }
    }

    pub fn test_account() -> account::Model {
        account::Model {
            id: 7,
            username: "manager".to_string(),
            password: String::new(),
            full_name: "Morgan Manager".to_string(),
            email: None,
            role: "manager".to_string(),
            status: 1,
            last_login: 0,
            created_at: 0,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new(&test_config());
        let pair = service.issue_pair(&test_account()).unwrap();

        let claims = service.verify(&pair.access, TokenKind::Access).unwrap();
        assert_eq!(claims.account_id(), Ok(7));
        assert_eq!(claims.username, "manager");
        assert_eq!(claims.role, "manager");

        let refresh = service.verify(&pair.refresh, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert_eq!(pair.refresh_hash, hash_refresh(&pair.refresh));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let service = TokenService::new(&test_config());
        let pair = service.issue_pair(&test_account()).unwrap();
        assert_eq!(
            service.verify(&pair.refresh, TokenKind::Access).unwrap_err(),
            TokenError::WrongKind
        );
    }

    #[test]
    fn test_expired_token() {
        let service = TokenService::new(&test_config());
        let long_ago = chrono::Utc::now().timestamp() - 3600;
        let token = service
            .sign(&test_account(), TokenKind::Access, long_ago)
            .unwrap();
        assert_eq!(service.verify(&token, TokenKind::Access).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn test_foreign_signature_is_invalid() {
        let service = TokenService::new(&test_config());
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret-another-secret-1234".to_string(),
            ..AuthConfig::default()
        });
        let token = other.issue_pair(&test_account()).unwrap().access;
        assert!(matches!(
            service.verify(&token, TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(
            service.verify("not-a-jwt", TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let service = TokenService::new(&test_config());
        let now = chrono::Utc::now().timestamp();
        let a = service.issue_pair_at(&test_account(), now).unwrap();
        let b = service.issue_pair_at(&test_account(), now).unwrap();
        assert_ne!(a.refresh_hash, b.refresh_hash);
        assert_eq!(a.refresh_hash.len(), 64);
    }

    #[test]
    fn test_cookie_attributes() {
        let service = TokenService::new(&test_config());
        let access = service.access_cookie("abc".to_string()).to_string();
        assert!(access.starts_with("access_token=abc"));
        assert!(access.contains("HttpOnly"));
        assert!(access.contains("Path=/"));
        assert!(access.contains("Max-Age=900"));

        let refresh = service.refresh_cookie("xyz".to_string()).to_string();
        assert!(refresh.contains("Path=/api"));
        assert!(refresh.contains("Max-Age=604800"));

        for cookie in service.clear_cookies() {
            assert!(cookie.to_string().contains("Max-Age=0"));
        }
    }
}

use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::AUTHORIZATION, web, FromRequest, HttpRequest};
use jwt_compact::{
    alg::{Hs256, Hs256Key},
    AlgorithmExt,
    Claims,
    Header,
    TimeOptions,
    Token,
    UntrustedToken,
};
use log::debug;
use loyalty_engine::db_types::User;
use serde::{Deserialize, Serialize};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

pub const ACCESS_TOKEN_COOKIE: &str = "lp_access_token";

/// The claims carried by an access token. The host hands the engine a validated `user_id`; this
/// is where it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    pub user_id: i64,
    pub email: String,
}

//--------------------------------------    TokenIssuer     ----------------------------------------------------------
pub struct TokenIssuer {
    key: Hs256Key,
    expiry: chrono::Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let key = Hs256Key::new(config.jwt_secret.reveal().as_bytes());
        let expiry = chrono::Duration::seconds(config.token_expiry.as_secs() as i64);
        Self { key, expiry }
    }

    /// Issue a new access token for the given claims. The caller is responsible for having
    /// verified the user's credentials first.
    pub fn issue_token(&self, claims: JwtClaims) -> Result<String, AuthError> {
        let time_options = TimeOptions::default();
        let claims = Claims::new(claims).set_duration_and_issuance(&time_options, self.expiry);
        let header = Header::empty().with_token_type("JWT");
        Hs256.token(&header, &claims, &self.key).map_err(|e| AuthError::ValidationError(format!("{e:?}")))
    }

    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let untrusted = UntrustedToken::new(token).map_err(|e| AuthError::PoorlyFormattedToken(format!("{e:?}")))?;
        let token: Token<JwtClaims> =
            Hs256.validator(&self.key).validate(&untrusted).map_err(|e| AuthError::ValidationError(format!("{e}")))?;
        token
            .claims()
            .validate_expiration(&TimeOptions::default())
            .map_err(|e| AuthError::ValidationError(format!("{e}")))?;
        debug!("💻️ Access token validated for user #{}", token.claims().custom.user_id);
        Ok(token.claims().custom.clone())
    }
}

/// Verifies a plaintext password against the stored digest.
pub fn verify_password(user: &User, password: &str) -> bool {
    bcrypt::verify(password, &user.password_hash).unwrap_or(false)
}

/// Hashes a plaintext password for storage.
pub fn hash_password(password: &str) -> Result<String, ServerError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).map_err(|e| ServerError::BackendError(e.to_string()))
}

/// Extracts and validates the access token from the `Authorization: Bearer` header, falling
/// back to the `lp_access_token` cookie.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_claims(req))
    }
}

fn extract_claims(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::Unspecified("TokenIssuer is not configured".to_string()))?;
    let token = bearer_token(req)
        .or_else(|| req.cookie(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AuthError::MissingToken)?;
    let claims = issuer.validate_token(&token)?;
    Ok(claims)
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use lp_common::Secret;

    use super::{JwtClaims, TokenIssuer};
    use crate::config::AuthConfig;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&AuthConfig {
            jwt_secret: Secret::new("super-secret-test-key".to_string()),
            token_expiry: Duration::from_secs(3600),
        })
    }

    #[test]
    fn token_round_trip() {
        let issuer = issuer();
        let claims = JwtClaims { user_id: 42, email: "alice@x".to_string() };
        let token = issuer.issue_token(claims.clone()).unwrap();
        let validated = issuer.validate_token(&token).unwrap();
        assert_eq!(validated, claims);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let issuer = issuer();
        assert!(issuer.validate_token("not-a-jwt").is_err());
    }

    #[test]
    fn wrong_key_is_rejected() {
        let issuer = issuer();
        let other = TokenIssuer::new(&AuthConfig {
            jwt_secret: Secret::new("a-different-key".to_string()),
            token_expiry: Duration::from_secs(3600),
        });
        let token = other.issue_token(JwtClaims { user_id: 1, email: "bob@x".to_string() }).unwrap();
        assert!(issuer.validate_token(&token).is_err());
    }

    #[test]
    fn password_hashing_round_trip() {
        let hash = super::hash_password("hunter2").unwrap();
        let user = loyalty_engine::db_types::User {
            id: 1,
            email: "alice@x".to_string(),
            password_hash: hash,
            current_balance: lp_common::Points::from(0),
            withdrawn: lp_common::Points::from(0),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        assert!(super::verify_password(&user, "hunter2"));
        assert!(!super::verify_password(&user, "hunter3"));
    }
}

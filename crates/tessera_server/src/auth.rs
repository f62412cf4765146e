//! Identity resolution for sync requests.
//!
//! Every push and pull acts on behalf of a user. The transport hands the
//! server some [`Credentials`]; an [`IdentityResolver`] turns them into a
//! stable [`UserId`] or rejects the request.
//!
//! ## Token Format
//!
//! Tokens minted by [`TokenValidator`] are composed of:
//! - 2 bytes: user ID length (big-endian)
//! - N bytes: user ID (UTF-8)
//! - 8 bytes: issue timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 signature over everything before it
//!
//! Transports typically hex- or base64-encode the bytes.

use crate::error::{ServerError, ServerResult};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tessera_protocol::UserId;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_LEN: usize = 32;
const TIMESTAMP_LEN: usize = 8;

/// Credentials presented with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A signed token.
    Token(Vec<u8>),
    /// A user already authenticated by the transport.
    User(UserId),
}

/// Maps request credentials to a user.
pub trait IdentityResolver: Send + Sync {
    /// Resolves the user, or fails with [`ServerError::AuthenticationFailed`].
    fn resolve(&self, credentials: &Credentials) -> ServerResult<UserId>;
}

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration with a 24 hour expiry.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Mints and validates user tokens.
#[derive(Clone)]
pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Creates a token for `user`, issued now.
    pub fn create_token(&self, user: &UserId) -> ServerResult<Vec<u8>> {
        self.create_token_at(user, now_millis())
    }

    fn create_token_at(&self, user: &UserId, issued_at: u64) -> ServerResult<Vec<u8>> {
        let user_bytes = user.as_str().as_bytes();
        let len = u16::try_from(user_bytes.len())
            .map_err(|_| ServerError::InvalidRequest("user id too long for token".into()))?;

        let mut token =
            Vec::with_capacity(2 + user_bytes.len() + TIMESTAMP_LEN + SIGNATURE_LEN);
        token.extend_from_slice(&len.to_be_bytes());
        token.extend_from_slice(user_bytes);
        token.extend_from_slice(&issued_at.to_be_bytes());

        let mut mac = self.mac()?;
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());
        Ok(token)
    }

    /// Validates a token and returns the user it was issued to.
    pub fn validate_token(&self, token: &[u8]) -> ServerResult<UserId> {
        let fail = |reason: &str| ServerError::AuthenticationFailed(reason.into());

        let (len_bytes, rest) = token
            .split_first_chunk::<2>()
            .ok_or_else(|| fail("token too short"))?;
        let user_len = usize::from(u16::from_be_bytes(*len_bytes));
        if rest.len() != user_len + TIMESTAMP_LEN + SIGNATURE_LEN {
            return Err(fail("invalid token length"));
        }

        let signed_len = 2 + user_len + TIMESTAMP_LEN;
        let (signed, signature) = token.split_at(signed_len);
        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(signature)
            .map_err(|_| fail("invalid signature"))?;

        let user = std::str::from_utf8(&rest[..user_len])
            .map_err(|_| fail("user id is not UTF-8"))?;
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&rest[user_len..user_len + TIMESTAMP_LEN]);
        let issued_at = u64::from_be_bytes(ts);

        let expiry_millis = u64::try_from(self.config.token_expiry.as_millis()).unwrap_or(u64::MAX);
        if now_millis() > issued_at.saturating_add(expiry_millis) {
            return Err(fail("token expired"));
        }

        Ok(UserId::new(user))
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::AuthenticationFailed(format!("unusable secret: {e}")))
    }
}

fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Resolves [`Credentials::Token`] with a [`TokenValidator`].
#[derive(Clone)]
pub struct TokenIdentityResolver {
    validator: TokenValidator,
}

impl TokenIdentityResolver {
    /// Creates a resolver backed by `validator`.
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }
}

impl IdentityResolver for TokenIdentityResolver {
    fn resolve(&self, credentials: &Credentials) -> ServerResult<UserId> {
        match credentials {
            Credentials::Token(token) => self.validator.validate_token(token),
            Credentials::User(_) => Err(ServerError::AuthenticationFailed(
                "token required".into(),
            )),
        }
    }
}

/// Accepts users authenticated upstream. Tokens are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedIdentityResolver;

impl IdentityResolver for TrustedIdentityResolver {
    fn resolve(&self, credentials: &Credentials) -> ServerResult<UserId> {
        match credentials {
            Credentials::User(user) if !user.as_str().is_empty() => Ok(user.clone()),
            Credentials::User(_) => Err(ServerError::AuthenticationFailed("empty user id".into())),
            Credentials::Token(_) => Err(ServerError::AuthenticationFailed(
                "token authentication is not enabled".into(),
            )),
        }
    }
}

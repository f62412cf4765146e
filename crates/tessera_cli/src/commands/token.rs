//! Token commands.

use std::time::Duration;
use tessera_server::{AuthConfig, TokenValidator};

/// Mints a token for `user` and returns it hex-encoded.
pub fn mint(user: &str, secret: &[u8]) -> Result<String, Box<dyn std::error::Error>> {
    let validator = TokenValidator::new(AuthConfig::new(secret.to_vec()));
    let token = validator.create_token(&user.into())?;
    Ok(hex::encode(token))
}

/// Validates a hex token and returns the user it was issued to.
pub fn verify(
    token: &str,
    secret: &[u8],
    expiry_secs: u64,
) -> Result<String, Box<dyn std::error::Error>> {
    let bytes = hex::decode(token.trim())?;
    let config = AuthConfig::new(secret.to_vec()).with_expiry(Duration::from_secs(expiry_secs));
    let user = TokenValidator::new(config).validate_token(&bytes)?;
    Ok(user.to_string())
}

//! Authentication
//!
//! Tokens carry the caller's role and, for client users, the linked client.
//! Authorization itself happens in the billing services against the
//! [`Actor`] built from the claims.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::ClientId;
use domain_billing::{Actor, Role};

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub role: Role,
    /// Linked client, required for `CLIENT` tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Client token without a client id")]
    MissingClient,
}

impl Claims {
    /// The actor these claims authenticate
    pub fn actor(&self) -> Result<Actor, AuthError> {
        match (self.role, self.client_id) {
            (Role::Client, Some(client_id)) => Ok(Actor::client(self.sub.clone(), client_id)),
            (Role::Client, None) => Err(AuthError::MissingClient),
            (role, _) => Ok(Actor::staff(self.sub.clone(), role)),
        }
    }
}

/// Creates a new JWT token
///
/// # Arguments
///
/// * `user_id` - User identifier
/// * `role` - User's role
/// * `client_id` - Linked client for client users
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    user_id: &str,
    role: Role,
    client_id: Option<ClientId>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        client_id,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AuthError::InvalidToken)
}

/// Validates a JWT token
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_staff_token_round_trip() {
        let token = create_token("fm-1", Role::FinanceManager, None, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        let actor = claims.actor().unwrap();

        assert_eq!(actor.user_id, "fm-1");
        assert_eq!(actor.role, Role::FinanceManager);
        assert!(actor.client_id.is_none());
    }

    #[test]
    fn test_client_token_carries_client() {
        let client_id = ClientId::new();
        let token = create_token("c-1", Role::Client, Some(client_id), SECRET, 60).unwrap();
        let actor = validate_token(&token, SECRET).unwrap().actor().unwrap();

        assert_eq!(actor.client_id, Some(client_id));
        assert!(actor.can_pay_via_gateway());
    }

    #[test]
    fn test_client_token_without_client_rejected() {
        let token = create_token("c-1", Role::Client, None, SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert!(matches!(claims.actor(), Err(AuthError::MissingClient)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_token("a-1", Role::Admin, None, SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }
}

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::user::{Session, UserProfile};
use crate::error::{Result, RustyHubError};

const MAX_TOKEN_LENGTH: usize = 4096;

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID)
    pub sub: String,
    /// Username
    pub username: String,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Workspace the session is bound to
    pub workspace_id: i64,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
    /// Not before (as UTC timestamp)
    pub nbf: usize,
}

impl Claims {
    /// Creates new claims for a user, valid for 24 hours
    pub fn new(user_id: i64, username: String, workspace_id: i64) -> Self {
        Self::with_expiration(user_id, username, workspace_id, 24)
    }

    /// Creates claims with custom expiration
    pub fn with_expiration(user_id: i64, username: String, workspace_id: i64, hours: usize) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        Self {
            sub: user_id.to_string(),
            username,
            display_name: None,
            avatar_url: None,
            workspace_id,
            exp: now + hours * 3600,
            iat: now,
            nbf: now,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        now > self.exp
    }

    /// Turn validated claims into a session
    pub fn into_session(self) -> Result<Session> {
        let user_id: i64 = self
            .sub
            .parse()
            .map_err(|_| RustyHubError::AuthError("Subject is not a user id".to_string()))?;

        if self.username.is_empty() || self.username.len() > 50 {
            return Err(RustyHubError::AuthError("Invalid username claim".to_string()));
        }

        Ok(Session {
            profile: UserProfile {
                id: user_id,
                username: self.username,
                display_name: self.display_name,
                avatar_url: self.avatar_url,
            },
            workspace_id: self.workspace_id,
        })
    }
}

/// Manages JWT token operations
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.validate_nbf = true;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| RustyHubError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RustyHubError::AuthError(format!("Invalid token: {}", e)))
    }

    /// Extracts claims from a token string
    pub fn get_claims(&self, token: &str) -> Result<Claims> {
        let token_data = self.validate_token(token)?;
        if token_data.claims.is_expired() {
            return Err(RustyHubError::AuthError("Token expired".to_string()));
        }
        Ok(token_data.claims)
    }
}

/// Resolves a bearer credential to a session before a socket upgrade is allowed
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Session>;
}

pub type SharedSessionResolver = Arc<dyn SessionResolver>;

/// Session lookup backed by signed JWTs
pub struct JwtSessionResolver {
    tokens: TokenManager,
}

impl JwtSessionResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            tokens: TokenManager::new(secret),
        }
    }
}

#[async_trait]
impl SessionResolver for JwtSessionResolver {
    async fn resolve(&self, token: &str) -> Result<Session> {
        if token.len() > MAX_TOKEN_LENGTH {
            return Err(RustyHubError::AuthError("Token too long".to_string()));
        }
        if token.chars().any(|c| c.is_control()) {
            return Err(RustyHubError::AuthError(
                "Token contains invalid characters".to_string(),
            ));
        }

        self.tokens.get_claims(token)?.into_session()
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

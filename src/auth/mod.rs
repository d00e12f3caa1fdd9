use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Claims, TokenInfo};

/// Bearer token service. Tokens are HS256 JWTs carrying {game, room, user, exp}.
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.token_secret.as_bytes()),
            expiry_seconds: config.token_expiry_seconds,
        }
    }

    /// Sign a token for `info`. A zero `expiry` falls back to the configured lifetime.
    pub fn generate_token(&self, info: &TokenInfo) -> Result<String> {
        let now = Utc::now().timestamp();
        let lifetime = if info.expiry.is_zero() {
            self.expiry_seconds
        } else {
            info.expiry.as_secs()
        };

        let claims = Claims {
            sub: info.user_id.to_string(),
            game_id: info.game_id.to_string(),
            room_id: info.room_id.to_string(),
            iat: now,
            exp: now + lifetime as i64,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a token and return the identity it carries
    pub fn parse_token(&self, token: &str) -> Result<TokenInfo> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(token.trim(), &self.decoding_key, &validation)
            .map_err(|e| AppError::InvalidToken(e.to_string()))?;
        let claims = token_data.claims;

        let remaining = (claims.exp - Utc::now().timestamp()).max(0) as u64;

        Ok(TokenInfo {
            game_id: parse_id("game_id", &claims.game_id)?,
            room_id: parse_id("room_id", &claims.room_id)?,
            user_id: parse_id("sub", &claims.sub)?,
            expiry: Duration::from_secs(remaining),
        })
    }

    /// Parse a raw datagram body as a token
    pub fn parse_bytes(&self, raw: &[u8]) -> Result<TokenInfo> {
        let token = std::str::from_utf8(raw)
            .map_err(|_| AppError::InvalidToken("token is not valid UTF-8".to_string()))?;
        self.parse_token(token)
    }
}

fn parse_id(field: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|_| AppError::InvalidToken(format!("{} is not a UUID", field)))
}

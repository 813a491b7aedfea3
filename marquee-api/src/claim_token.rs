//! Claim Tokens
//!
//! Signed, self-contained tokens that bind an account identity to an expiry.
//! A token is a compact HS256 JWS. Signature checks are delegated to
//! `jsonwebtoken`; expiry is evaluated here against the injected [`Clock`]
//! so redemption decisions never read the system time directly.

use std::collections::HashSet;
use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use marquee_core::{
    Clock, ConfigError, MarqueeError, CLAIM_COOLDOWN_SECS, CLAIM_TOKEN_TTL_SECS,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Secrets shorter than this are refused in production.
pub const MIN_PRODUCTION_SECRET_LEN: usize = 32;

const CLAIM_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// CLAIM SECRET (TYPE-SAFE)
// ============================================================================

/// Signing secret for claim tokens. Never printed.
#[derive(Clone)]
pub struct ClaimSecret(SecretString);

impl ClaimSecret {
    /// Wrap a secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty or only whitespace.
    pub fn new(secret: String) -> Result<Self, MarqueeError> {
        if secret.trim().is_empty() {
            return Err(MarqueeError::Config(ConfigError::MissingRequired {
                field: "MARQUEE_CLAIM_SECRET".to_string(),
            }));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Get the length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for ClaimSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClaimSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Settings for issuing and redeeming claim tokens.
#[derive(Debug, Clone)]
pub struct ClaimConfig {
    pub secret: ClaimSecret,

    /// Validity of an issued token (default: 24 hours).
    pub token_ttl: chrono::Duration,

    /// Minimum spacing between two successful claims on one account
    /// (default: 12 hours).
    pub cooldown: chrono::Duration,

    /// Prefix for generated claim links, e.g. `https://marquee.tv`.
    pub public_base_url: Option<String>,
}

impl ClaimConfig {
    /// Config with default lifetimes around an explicit secret.
    pub fn with_secret(secret: ClaimSecret) -> Self {
        Self {
            secret,
            token_ttl: chrono::Duration::seconds(CLAIM_TOKEN_TTL_SECS),
            cooldown: chrono::Duration::seconds(CLAIM_COOLDOWN_SECS),
            public_base_url: None,
        }
    }

    /// Load claim settings from environment variables.
    ///
    /// # Environment Variables
    /// - `MARQUEE_CLAIM_SECRET`: Token signing secret (required)
    /// - `MARQUEE_CLAIM_TOKEN_TTL_SECS`: Token validity (default: 86400)
    /// - `MARQUEE_CLAIM_COOLDOWN_SECS`: Per-account cooldown (default: 43200)
    /// - `MARQUEE_PUBLIC_BASE_URL`: Prefix for claim links (default: none)
    ///
    /// # Errors
    /// Fails when `MARQUEE_CLAIM_SECRET` is unset or empty.
    pub fn from_env() -> Result<Self, MarqueeError> {
        let secret = std::env::var("MARQUEE_CLAIM_SECRET").map_err(|_| {
            MarqueeError::Config(ConfigError::MissingRequired {
                field: "MARQUEE_CLAIM_SECRET".to_string(),
            })
        })?;

        let mut config = Self::with_secret(ClaimSecret::new(secret)?);

        if let Some(secs) = std::env::var("MARQUEE_CLAIM_TOKEN_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|secs| *secs > 0)
        {
            config.token_ttl = chrono::Duration::seconds(secs);
        }

        if let Some(secs) = std::env::var("MARQUEE_CLAIM_COOLDOWN_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|secs| *secs >= 0)
        {
            config.cooldown = chrono::Duration::seconds(secs);
        }

        config.public_base_url = std::env::var("MARQUEE_PUBLIC_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty());

        Ok(config)
    }

    /// Refuse short secrets in production, warn about them elsewhere.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        self.check_secret_strength(crate::routes::is_production_environment())
    }

    fn check_secret_strength(&self, is_production: bool) -> ApiResult<()> {
        let len = self.secret.len();
        if len >= MIN_PRODUCTION_SECRET_LEN {
            return Ok(());
        }

        if is_production {
            return Err(ApiError::invalid_input(format!(
                "Claim secret is too short for production use ({} chars). \
                 It must be at least {} characters long.",
                len, MIN_PRODUCTION_SECRET_LEN
            )));
        }

        tracing::warn!(
            secret_len = len,
            "Claim secret is short. Use at least {} characters before deploying.",
            MIN_PRODUCTION_SECRET_LEN
        );
        Ok(())
    }
}

// ============================================================================
// CLAIMS
// ============================================================================

/// Payload carried by a claim token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTokenClaims {
    /// Account pseudo the token was issued for.
    pub identity: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("claim token has expired")]
    Expired,

    #[error("claim token is invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// ISSUER / VERIFIER
// ============================================================================

/// Issues and verifies claim tokens with a single shared secret.
#[derive(Clone)]
pub struct ClaimTokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
    public_base_url: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ClaimTokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimTokenIssuer")
            .field("ttl", &self.ttl)
            .field("public_base_url", &self.public_base_url)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ClaimTokenIssuer {
    pub fn new(config: &ClaimConfig, clock: Arc<dyn Clock>) -> Self {
        let secret = config.secret.expose().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: config.token_ttl,
            public_base_url: config.public_base_url.clone(),
            clock,
        }
    }

    /// Sign a token for `identity`, valid from now for the configured TTL.
    pub fn issue(&self, identity: &str) -> ApiResult<String> {
        let now = self.clock.now().timestamp();
        let claims = ClaimTokenClaims {
            identity: identity.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl.num_seconds()),
        };

        encode(&Header::new(CLAIM_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| ApiError::internal_error(format!("Failed to sign claim token: {}", e)))
    }

    /// Check the signature and expiry of `token`.
    ///
    /// A token stays valid up to and including its `exp` second.
    pub fn verify(&self, token: &str) -> Result<ClaimTokenClaims, TokenError> {
        let mut validation = Validation::new(CLAIM_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let claims = decode::<ClaimTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    TokenError::Invalid("signature mismatch".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    TokenError::Invalid("malformed token".to_string())
                }
                _ => TokenError::Invalid(e.to_string()),
            })?
            .claims;

        if self.clock.now().timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Redemption link for `identity`, carrying a fresh token.
    pub fn claim_link(&self, identity: &str) -> ApiResult<String> {
        let token = self.issue(identity)?;
        let base = self.public_base_url.as_deref().unwrap_or("");
        Ok(format!(
            "{}/claim-premium?token={}",
            base,
            urlencoding::encode(&token)
        ))
    }
}

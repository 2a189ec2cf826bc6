/// Access-token signing and validation
///
/// Access tokens are short-lived signed JWTs carrying `{sub, iat, exp, jti, type}`.
/// Keys are held by a [`JwtKeys`] value built once at start-up and handed to
/// whoever signs or validates tokens. There is no process-wide key registry.
///
/// ## Security Design
///
/// - **Pinned algorithm**: validation only accepts the algorithm the keys were built for
/// - **Zero leeway**: a token is expired the second its `exp` passes
/// - **Typed failures**: expiry is reported separately from every other rejection
///   so callers can log the real reason while answering with one message
///
/// ## Usage
///
/// ```rust
/// use chrono::Duration;
/// use crypto_core::jwt::JwtKeys;
/// use uuid::Uuid;
///
/// let keys = JwtKeys::from_secret(b"an-hs256-secret-of-reasonable-length").unwrap();
/// let issued = keys.issue_access_token(Uuid::new_v4(), Duration::minutes(15)).unwrap();
/// let claims = keys.decode_access_token(&issued.token).unwrap();
/// assert_eq!(claims.jti, issued.claims.jti);
/// ```
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::token::generate_jti;

/// Value of the `type` claim on access tokens
pub const ACCESS_TOKEN_TYPE: &str = "access";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried by every access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account ID (UUID string)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token identifier, the revocation key
    pub jti: String,
    /// Always "access"
    #[serde(rename = "type")]
    pub token_type: String,
}

impl AccessClaims {
    /// Parse the subject as an account ID
    pub fn subject(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub)
            .map_err(|e| JwtError::Invalid(format!("subject is not a UUID: {e}")))
    }

    /// Expiry as a timestamp (falls back to the epoch for out-of-range values)
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// A freshly signed access token together with the claims it carries
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: String,
    pub claims: AccessClaims,
}

/// Signing and verification keys for one algorithm
#[derive(Clone)]
pub struct JwtKeys {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    /// HS256 keys from a shared secret
    ///
    /// ## Errors
    ///
    /// Returns `JwtError::Key` if the secret is empty.
    pub fn from_secret(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::Key("HS256 secret must not be empty".to_string()));
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// RS256 keys from PEM-encoded RSA private and public keys
    ///
    /// ## Arguments
    ///
    /// * `private_key_pem` - RSA private key in PEM format (for signing)
    /// * `public_key_pem` - RSA public key in PEM format (for validation)
    pub fn from_rsa_pem(private_key_pem: &str, public_key_pem: &str) -> Result<Self, JwtError> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| JwtError::Key(format!("Failed to parse RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a new access token for `subject` valid for `ttl`
    ///
    /// A fresh random `jti` is drawn for every token.
    pub fn issue_access_token(
        &self,
        subject: Uuid,
        ttl: Duration,
    ) -> Result<IssuedAccessToken, JwtError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: generate_jti(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| JwtError::Signing(e.to_string()))?;

        Ok(IssuedAccessToken { token, claims })
    }

    /// Verify signature, expiry and claim shape of an access token
    ///
    /// Does not consult any revocation list; that is the caller's job.
    ///
    /// ## Errors
    ///
    /// - `JwtError::Expired` if `exp` has passed
    /// - `JwtError::Invalid` for a bad signature, malformed token, wrong `type`
    ///   or a subject that is not a UUID
    pub fn decode_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        let data = decode::<AccessClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => {
                    debug!(error = %e, "access token failed verification");
                    JwtError::Invalid(e.to_string())
                }
            }
        })?;

        let claims = data.claims;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(JwtError::Invalid(format!(
                "unexpected token type: {}",
                claims.token_type
            )));
        }
        if claims.jti.is_empty() {
            return Err(JwtError::Invalid("missing jti".to_string()));
        }
        claims.subject()?;

        Ok(claims)
    }
}

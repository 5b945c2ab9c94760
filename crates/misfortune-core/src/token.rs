//! Signed, time-limited wheel tokens.
//!
//! A wheel token binds a paired wheel client to one wheel: the claims
//! carry the wheel id as subject plus an expiry, and an HMAC-SHA256
//! signature over the claims keeps them tamper-proof. Wire format is
//! `base64url(claims).base64url(signature)`, both unpadded.
//!
//! The token is the client's long-lived credential. It is distinct from
//! the ephemeral spin code, which is a bearer capability scoped to a
//! single spin/unlock cycle.
//!
//! Verification failures deliberately collapse to one outcome for
//! callers: malformed, tampered, and expired tokens are all just
//! "invalid", mapped to a policy-violation rejection at the edge.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use misfortune_types::WheelId;

/// Default token lifetime, in hours.
pub const TOKEN_TTL_HOURS: i64 = 24;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced when signing or verifying wheel tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is not two base64url sections joined by a dot.
    #[error("malformed token")]
    Malformed,

    /// The signature does not match the claims.
    #[error("invalid token signature")]
    BadSignature,

    /// The token's expiry has passed.
    #[error("token expired")]
    Expired,

    /// The claims could not be serialized or parsed.
    #[error("malformed token claims: {0}")]
    Claims(#[from] serde_json::Error),

    /// The signing key was rejected by the MAC implementation.
    #[error("invalid signing key")]
    Key,
}

/// Claims carried by a wheel token.
#[derive(Debug, Serialize, Deserialize)]
struct WheelClaims {
    /// The wheel the bearer is bound to.
    wheel_id: WheelId,
    /// Expiry as a Unix timestamp (seconds).
    exp: i64,
}

/// Signs and verifies wheel tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    /// Create a signer from the shared secret.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a token binding the bearer to `wheel_id` for `ttl`.
    pub fn sign(&self, wheel_id: WheelId, ttl: TimeDelta) -> Result<String, TokenError> {
        let exp = Utc::now()
            .checked_add_signed(ttl)
            .ok_or(TokenError::Malformed)?
            .timestamp();
        let claims = serde_json::to_vec(&WheelClaims { wheel_id, exp })?;
        let signature = self.mac(&claims)?.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&claims),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Sign a token with the default lifetime.
    pub fn sign_default(&self, wheel_id: WheelId) -> Result<String, TokenError> {
        self.sign(wheel_id, TimeDelta::hours(TOKEN_TTL_HOURS))
    }

    /// Verify a token and extract the bound wheel id.
    ///
    /// The signature check runs in constant time before the claims are
    /// even parsed, so attacker-controlled claims never reach the JSON
    /// parser unauthenticated.
    pub fn verify(&self, token: &str) -> Result<WheelId, TokenError> {
        let (claims_part, signature_part) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let claims = URL_SAFE_NO_PAD
            .decode(claims_part)
            .map_err(|_invalid| TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_part)
            .map_err(|_invalid| TokenError::Malformed)?;

        self.mac(&claims)?
            .verify_slice(&signature)
            .map_err(|_mismatch| TokenError::BadSignature)?;

        let claims: WheelClaims = serde_json::from_slice(&claims)?;
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(claims.wheel_id)
    }

    /// Build the keyed MAC over `data`.
    fn mac(&self, data: &[u8]) -> Result<HmacSha256, TokenError> {
        // HMAC-SHA256 accepts keys of any length, so this only fails if
        // the MAC implementation itself rejects the key.
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_length| TokenError::Key)?;
        mac.update(data);
        Ok(mac)
    }
}

impl core::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Never print the secret.
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn signer() -> TokenSigner {
        TokenSigner::new(*b"test-secret")
    }

    #[test]
    fn sign_verify_roundtrip() {
        let wheel_id = WheelId::new();
        let token = signer().sign_default(wheel_id).unwrap();
        assert_eq!(signer().verify(&token).unwrap(), wheel_id);
    }

    #[test]
    fn tampered_claims_are_rejected() {
        let token = signer().sign_default(WheelId::new()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&WheelClaims {
                wheel_id: WheelId::new(),
                exp: i64::MAX,
            })
            .unwrap(),
        );
        let forged = format!("{forged_claims}.{signature}");

        assert!(matches!(
            signer().verify(&forged),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = signer().sign_default(WheelId::new()).unwrap();
        let other = TokenSigner::new(*b"other-secret");
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = signer()
            .sign(WheelId::new(), TimeDelta::hours(-1))
            .unwrap();
        assert!(matches!(signer().verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            signer().verify("no-dot-here"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(
            signer().verify("not!base64.also!not"),
            Err(TokenError::Malformed)
        ));
    }
}

//! Messages exchanged over the WebSocket and the bot-facing REST API.
//!
//! The wheel client speaks three messages: [`WheelLogin`] (first frame
//! after connecting), [`WheelRegistrationInfo`] (server reply when the
//! client has no token yet), and [`WheelCredentials`] (server reply once
//! the owner confirms the pairing). The `Telegram*` types are the
//! projections served to the chat bot.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::ids::{RegistrationId, WheelId};
use crate::state::Drink;

/// First frame a wheel client sends after connecting.
///
/// `token` carries a previously issued wheel token, or `None` to request
/// a new registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelLogin {
    /// Signed wheel token from an earlier pairing, if any.
    pub token: Option<String>,
}

/// Registration descriptor sent to an unpaired wheel client.
///
/// The client renders the deep link (or a QR code of it) so the wheel
/// owner can confirm the pairing from the chat bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelRegistrationInfo {
    /// Handle identifying this pending registration.
    pub registration_id: RegistrationId,
    /// Deep link the owner opens to confirm the pairing.
    pub telegram_url: String,
}

impl WheelRegistrationInfo {
    /// Build the descriptor for a pending registration.
    ///
    /// The deep link encodes the registration id as URL-safe base64 in the
    /// bot's `start` parameter: `https://t.me/<bot>?start=<id>`.
    pub fn create(bot_name: &str, registration_id: RegistrationId) -> Self {
        let encoded = URL_SAFE_NO_PAD.encode(registration_id.into_inner().as_bytes());
        Self {
            registration_id,
            telegram_url: format!("https://t.me/{bot_name}?start={encoded}"),
        }
    }
}

/// Credentials issued to a wheel client once pairing is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelCredentials {
    /// Signed token binding the client to its wheel.
    pub token: String,
}

/// A wheel as presented to the chat bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramWheel {
    /// Display name.
    pub name: String,
    /// Wheel identity.
    pub id: WheelId,
    /// Whether the requesting user owns this wheel.
    pub is_owned: bool,
}

/// The set of wheels visible to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramWheels {
    /// Wheels the user may see.
    pub wheels: Vec<TelegramWheel>,
}

/// One wheel plus its drink list, as presented to the chat bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramWheelState {
    /// The wheel.
    pub wheel: TelegramWheel,
    /// Drinks on the wheel.
    pub drinks: Vec<Drink>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn registration_info_builds_deep_link() {
        let id = RegistrationId::new();
        let info = WheelRegistrationInfo::create("misfortune_bot", id);
        assert!(
            info.telegram_url
                .starts_with("https://t.me/misfortune_bot?start=")
        );
        // 16 uuid bytes encode to 22 base64url characters, no padding.
        let (_, encoded) = info.telegram_url.split_once("start=").unwrap();
        assert_eq!(encoded.len(), 22);
        assert!(!encoded.contains('='));
    }

    #[test]
    fn login_roundtrip_preserves_missing_token() {
        let login: WheelLogin = serde_json::from_str(r#"{"token":null}"#).unwrap();
        assert_eq!(login.token, None);

        let login: WheelLogin = serde_json::from_str(r#"{"token":"abc"}"#).unwrap();
        assert_eq!(login.token.as_deref(), Some("abc"));
    }
}

//! Entitlement (Steam session) capability.
//!
//! The session transport itself is external; freebie only needs the
//! commands below plus a stream of typed lifecycle events.

use crate::models::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Logon credentials for one attempt.
///
/// The two-factor code is only valid for its 30 second window, so a fresh
/// value is generated per attempt.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub account_name: String,
    pub password: String,
    pub two_factor_code: String,
    /// Previously issued sentry blob, if one was persisted
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "opt_base64::serialize")]
    pub sentry: Option<Vec<u8>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_name", &self.account_name)
            .field("password", &"<redacted>")
            .field("two_factor_code", &"<redacted>")
            .field("sentry_bytes", &self.sentry.as_ref().map(Vec::len))
            .finish()
    }
}

/// Presence reported to friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaState(pub u8);

impl PersonaState {
    pub const ONLINE: Self = Self(1);
}

/// Lifecycle event emitted by the session transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Logon completed; the session accepts commands
    LoggedOn {
        #[serde(default)]
        steam_id: Option<String>,
    },
    /// A new sentry blob was issued and should replace the stored one
    Sentry {
        #[serde(deserialize_with = "base64_bytes::deserialize")]
        data: Vec<u8>,
    },
    /// The session failed; always terminal
    Error { message: String },
}

/// Commands accepted by an authenticated session.
#[async_trait]
pub trait EntitlementClient: Send + Sync {
    /// Start a logon attempt. Completion is reported as a [`SessionEvent`].
    async fn connect(&self, credentials: &Credentials) -> Result<()>;

    /// Set the presence shown to friends.
    async fn set_presence(&self, state: PersonaState) -> Result<()>;

    /// Replace the set of app ids reported as being played.
    async fn set_active_products(&self, app_ids: &[u32]) -> Result<()>;

    /// Request free licenses; returns the app ids actually granted.
    async fn request_free_licenses(&self, app_ids: &[u32]) -> Result<Vec<u32>>;
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

mod opt_base64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let events: Vec<SessionEvent> = serde_json::from_str(
            r#"[
                {"type":"logged_on","steam_id":"[U:1:42]"},
                {"type":"sentry","data":"AQID"},
                {"type":"error","message":"InvalidPassword"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            events,
            vec![
                SessionEvent::LoggedOn {
                    steam_id: Some("[U:1:42]".to_string())
                },
                SessionEvent::Sentry {
                    data: vec![1, 2, 3]
                },
                SessionEvent::Error {
                    message: "InvalidPassword".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_credentials_encode_sentry() {
        let creds = Credentials {
            account_name: "user".to_string(),
            password: "pw".to_string(),
            two_factor_code: "PV9M4".to_string(),
            sentry: Some(vec![1, 2, 3]),
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["sentry"], "AQID");

        let without = Credentials {
            sentry: None,
            ..creds
        };
        let json = serde_json::to_value(&without).unwrap();
        assert!(json.get("sentry").is_none());
    }

    #[test]
    fn test_credentials_debug_hides_secrets() {
        let creds = Credentials {
            account_name: "user".to_string(),
            password: "hunter2".to_string(),
            two_factor_code: "PV9M4".to_string(),
            sentry: None,
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("PV9M4"));
    }
}

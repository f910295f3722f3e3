//! Identity-provider boundary.
//!
//! The host platform (a messenger mini-app container, a test harness, a
//! launcher) knows who the local player is. The client only needs that
//! answer once, before it joins: [`acquire`] asks a provider a single time
//! and treats "no user" as a hard authentication failure.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, WheelClientError};

/// The local player's platform identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Platform user id.
    pub id: i64,
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Identity {
    /// Create an identity with only the required fields.
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: None,
            username: None,
        }
    }

    /// Set the last name.
    #[must_use]
    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    /// Set the platform username (without a leading `@`).
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Name announced to the game server: first name, plus last name when known.
    pub fn display_name(&self) -> String {
        match self.last_name.as_deref().map(str::trim) {
            Some(last) if !last.is_empty() => format!("{} {last}", self.first_name.trim()),
            _ => self.first_name.trim().to_string(),
        }
    }
}

/// Source of the local player's identity.
pub trait IdentityProvider {
    /// Returns the identity if the platform has supplied one.
    fn identity(&self) -> Option<Identity>;
}

/// Ask `provider` for an identity exactly once.
///
/// # Errors
///
/// Returns [`WheelClientError::Authentication`] if the provider has no user
/// or the user has a blank first name.
pub fn acquire(provider: &impl IdentityProvider) -> Result<Identity> {
    let Some(identity) = provider.identity() else {
        warn!("identity provider returned no user");
        return Err(WheelClientError::Authentication(
            "no user data available from the platform".into(),
        ));
    };
    if identity.first_name.trim().is_empty() {
        warn!(user_id = identity.id, "identity has a blank first name");
        return Err(WheelClientError::Authentication(
            "platform user has no name".into(),
        ));
    }
    debug!(user_id = identity.id, "identity acquired");
    Ok(identity)
}

// ── Providers ───────────────────────────────────────────────────────

/// A fixed identity, for development builds and tests.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

impl StaticIdentity {
    /// The stand-in user used when running outside the platform container.
    pub fn development() -> Self {
        Self(
            Identity::new(123_456_789, "Test")
                .with_last_name("User")
                .with_username("testuser"),
        )
    }
}

impl IdentityProvider for StaticIdentity {
    fn identity(&self) -> Option<Identity> {
        Some(self.0.clone())
    }
}

/// Identity parsed from the platform's launch data, `{"user": {...}}`.
#[derive(Debug, Clone, Default)]
pub struct InitDataIdentity {
    user: Option<Identity>,
}

#[derive(Deserialize)]
struct InitData {
    #[serde(default)]
    user: Option<Identity>,
}

impl InitDataIdentity {
    /// Parse launch data.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::Serialization`] if `raw` is not valid
    /// launch JSON. A well-formed document without a `user` is not an error
    /// here; [`acquire`] reports it.
    pub fn parse(raw: &str) -> Result<Self> {
        let data: InitData = serde_json::from_str(raw)?;
        Ok(Self { user: data.user })
    }
}

impl IdentityProvider for InitDataIdentity {
    fn identity(&self) -> Option<Identity> {
        self.user.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn display_name_joins_first_and_last() {
        let id = Identity::new(1, "Ada").with_last_name("Lovelace");
        assert_eq!(id.display_name(), "Ada Lovelace");
        assert_eq!(Identity::new(2, "Grace").display_name(), "Grace");
        assert_eq!(
            Identity::new(3, "Alan").with_last_name("  ").display_name(),
            "Alan"
        );
    }

    #[test]
    fn init_data_with_user_is_acquired() {
        let provider = InitDataIdentity::parse(
            r#"{"user":{"id":77,"first_name":"Ada","username":"ada"},"auth_date":1}"#,
        )
        .unwrap();
        let identity = acquire(&provider).unwrap();
        assert_eq!(identity.id, 77);
        assert_eq!(identity.username.as_deref(), Some("ada"));
        assert!(identity.last_name.is_none());
    }

    #[test]
    fn missing_user_is_an_authentication_failure() {
        let provider = InitDataIdentity::parse(r#"{"auth_date":1}"#).unwrap();
        let err = acquire(&provider).unwrap_err();
        assert!(matches!(err, WheelClientError::Authentication(_)));
    }

    #[test]
    fn blank_first_name_is_an_authentication_failure() {
        let provider = StaticIdentity(Identity::new(5, " "));
        assert!(matches!(
            acquire(&provider),
            Err(WheelClientError::Authentication(_))
        ));
    }

    #[test]
    fn malformed_init_data_is_a_serialization_error() {
        assert!(matches!(
            InitDataIdentity::parse("not json"),
            Err(WheelClientError::Serialization(_))
        ));
    }

    #[test]
    fn development_identity_is_usable() {
        let identity = acquire(&StaticIdentity::development()).unwrap();
        assert_eq!(identity.display_name(), "Test User");
    }
}

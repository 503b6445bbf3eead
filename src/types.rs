use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Identity subject identifier (the token's `uid` claim, or the provider's user id).
///
/// Opaque: the shell and the identity provider each choose their own format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Durable subset of a validated SSO token.
///
/// Created only from a token that passed every validation rule. Carries no
/// expiry: once persisted, a session is trusted until logout.
///
/// Serialized with the same keys the shell uses in its tokens, so records
/// written by earlier deployments stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "uid")]
    pub subject_id: SubjectId,
    pub email: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub year_of_study: String,
    pub role: String,
    pub is_admin: bool,
    #[serde(rename = "shellDomain")]
    pub shell_origin: String,
    #[serde(rename = "microAppDomain")]
    pub micro_app_origin: String,
}

/// Session as reported by the independent identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ProviderIdentity {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl ProviderIdentity {
    /// Create an identity with only the required subject id.
    #[must_use]
    pub fn new(subject_id: impl Into<SubjectId>) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: None,
            display_name: None,
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            subject_id: "u1".into(),
            email: "a@b.com".into(),
            display_name: "Ada".into(),
            year_of_study: "2nd Year".into(),
            role: "student".into(),
            is_admin: false,
            shell_origin: "https://shell.example.com".into(),
            micro_app_origin: "https://app.example.com".into(),
        }
    }

    #[test]
    fn session_uses_shell_wire_keys() {
        let json = serde_json::to_value(session()).unwrap();
        assert_eq!(json["uid"], "u1");
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["yearOfStudy"], "2nd Year");
        assert_eq!(json["isAdmin"], false);
        assert_eq!(json["shellDomain"], "https://shell.example.com");
        assert_eq!(json["microAppDomain"], "https://app.example.com");
        assert!(json.get("exp").is_none());
    }

    #[test]
    fn session_rejects_records_without_uid() {
        let json = r#"{"email":"a@b.com","name":"x","yearOfStudy":"1","role":"r","isAdmin":false,"shellDomain":"s","microAppDomain":"m"}"#;
        assert!(serde_json::from_str::<Session>(json).is_err());
    }

    #[test]
    fn subject_id_display() {
        let id = SubjectId::from("p1");
        assert_eq!(id.to_string(), "p1");
        assert_eq!(id.as_str(), "p1");
    }

    #[test]
    fn provider_identity_builder() {
        let identity = ProviderIdentity::new("p1").with_email("p@x.io");
        assert_eq!(identity.subject_id.as_str(), "p1");
        assert_eq!(identity.email.as_deref(), Some("p@x.io"));
        assert_eq!(identity.display_name, None);
    }
}

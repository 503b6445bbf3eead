//! Handoff URL handling: detecting, decoding, encoding and stripping the SSO
//! token the shell passes in the query string.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use url::Url;

/// Query parameter carrying the URL-encoded JSON token.
pub const TOKEN_PARAM: &str = "token";
/// Query parameter flagging an SSO handoff. Only the literal `"true"` counts.
pub const SSO_FLAG_PARAM: &str = "sso";
/// Query parameter naming the shell origin, used as a logout fallback.
pub const SHELL_PARAM: &str = "shell";

const SSO_FLAG_VALUE: &str = "true";
const HANDOFF_PARAMS: [&str; 3] = [TOKEN_PARAM, SSO_FLAG_PARAM, SHELL_PARAM];

/// Token decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid token encoding: {0}")]
    Encoding(String),
    #[error("token is not valid JSON: {0}")]
    Json(String),
    #[error("token payload is not a record")]
    NotARecord,
    #[error("token field has an unexpected type: {0}")]
    FieldType(String),
}

/// Untrusted token payload exactly as the shell sent it.
///
/// Every field is optional and nothing has been checked. Pass it through
/// [`TokenValidator`](crate::TokenValidator) to obtain an [`SsoToken`](crate::SsoToken).
/// Unknown keys (e.g. provider tokens the shell forwards) are ignored.
///
/// Only `uid` and `email` are held to their JSON type. Optional text fields
/// accept numbers and booleans in their string form and drop anything else,
/// so defaulting applies. `iat`/`exp` accept any JSON number (floats are
/// floored) or a numeric string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RawToken {
    #[serde(rename = "uid", default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(
        rename = "name",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub year_of_study: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag", skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(
        rename = "shellDomain",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub shell_origin: Option<String>,
    #[serde(
        rename = "microAppDomain",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub micro_app_origin: Option<String>,
    /// Issue time, Unix epoch seconds.
    #[serde(
        rename = "iat",
        default,
        deserialize_with = "lenient_epoch",
        skip_serializing_if = "Option::is_none"
    )]
    pub issued_at: Option<i64>,
    /// Expiry, Unix epoch seconds.
    #[serde(
        rename = "exp",
        default,
        deserialize_with = "lenient_epoch",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<i64>,
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match JsonValue::deserialize(d)? {
        JsonValue::String(s) => Some(s),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match JsonValue::deserialize(d)? {
        JsonValue::Bool(b) => Some(b),
        _ => None,
    })
}

fn lenient_epoch<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match JsonValue::deserialize(d)? {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(floor_seconds)),
        JsonValue::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(floor_seconds))
        }
        _ => None,
    })
}

fn floor_seconds(secs: f64) -> Option<i64> {
    // `as` saturates; out-of-range values land on i64::MIN/MAX.
    secs.is_finite().then(|| secs.floor() as i64)
}

impl RawToken {
    /// Create a token carrying the two required claims.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            email: Some(email.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_subject_id(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_year_of_study(mut self, year: impl Into<String>) -> Self {
        self.year_of_study = Some(year.into());
        self
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = Some(is_admin);
        self
    }

    #[must_use]
    pub fn with_shell_origin(mut self, origin: impl Into<String>) -> Self {
        self.shell_origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_micro_app_origin(mut self, origin: impl Into<String>) -> Self {
        self.micro_app_origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_issued_at(mut self, issued_at: i64) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Returns `true` iff the URL carries a `token` parameter and `sso=true`.
#[must_use]
pub fn detect(url: &Url) -> bool {
    query_param(url, TOKEN_PARAM).is_some()
        && query_param(url, SSO_FLAG_PARAM).as_deref() == Some(SSO_FLAG_VALUE)
}

/// Decodes the `token` parameter into an untrusted [`RawToken`].
///
/// The query parser undoes the outer URL encoding; the value itself is
/// URL-encoded JSON, so one more decoding pass is applied before parsing.
///
/// # Errors
///
/// Returns [`DecodeError`] if the parameter is absent, the inner encoding is
/// malformed, or the payload is not a JSON object of the expected shape.
pub fn decode(url: &Url) -> Result<RawToken, DecodeError> {
    let param =
        query_param(url, TOKEN_PARAM).ok_or(DecodeError::MissingParameter(TOKEN_PARAM))?;
    let json = urlencoding::decode(&param).map_err(|e| DecodeError::Encoding(e.to_string()))?;

    let value: JsonValue =
        serde_json::from_str(&json).map_err(|e| DecodeError::Json(e.to_string()))?;
    if !value.is_object() {
        return Err(DecodeError::NotARecord);
    }

    serde_json::from_value(value).map_err(|e| DecodeError::FieldType(e.to_string()))
}

/// Builds a handoff URL for `token` on top of `base`.
///
/// Existing query parameters on `base` are kept.
///
/// # Errors
///
/// Returns the serializer error if the token cannot be rendered as JSON.
pub fn encode(base: &Url, token: &RawToken, shell: Option<&Url>) -> Result<Url, serde_json::Error> {
    let json = serde_json::to_string(token)?;
    let encoded = urlencoding::encode(&json);

    let mut url = base.clone();
    {
        let mut pairs = url.query_pairs_mut();
        pairs
            .append_pair(TOKEN_PARAM, &encoded)
            .append_pair(SSO_FLAG_PARAM, SSO_FLAG_VALUE);
        if let Some(shell) = shell {
            pairs.append_pair(SHELL_PARAM, shell.as_str());
        }
    }
    Ok(url)
}

/// Returns `url` without the `token`, `sso` and `shell` parameters.
///
/// Applied after a successful handoff so the token cannot be replayed from
/// history or bookmarks. Other parameters and the fragment are untouched.
#[must_use]
pub fn strip(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !HANDOFF_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(&kept);
    }
    stripped
}

/// First value of the named query parameter.
pub(crate) fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

use crate::session::error::SessionError;
use std::fmt;

pub const API_KEY_ENV: &str = "METEOFRANCE_API_KEY";
pub const TOKEN_ENV: &str = "METEOFRANCE_TOKEN";
pub const APPLICATION_ID_ENV: &str = "METEOFRANCE_APPLICATION_ID";

/// What the caller handed in. At least one field must be set; blank strings
/// count as unset.
///
/// Precedence when several are set: `api_key`, then `token`, then
/// `application_id`. The application id is still kept next to a direct token
/// so an expired token can be renewed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub token: Option<String>,
    pub application_id: Option<String>,
}

impl Credentials {
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn application_id(application_id: impl Into<String>) -> Self {
        Self {
            application_id: Some(application_id.into()),
            ..Self::default()
        }
    }

    /// Reads `METEOFRANCE_API_KEY`, `METEOFRANCE_TOKEN` and
    /// `METEOFRANCE_APPLICATION_ID`. Unset variables stay `None`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok(),
            token: std::env::var(TOKEN_ENV).ok(),
            application_id: std::env::var(APPLICATION_ID_ENV).ok(),
        }
    }

    pub(crate) fn into_mode(self) -> Result<AuthMode, SessionError> {
        let api_key = usable(self.api_key);
        let token = usable(self.token);
        let application_id = usable(self.application_id);

        if let Some(key) = api_key {
            return Ok(AuthMode::ApiKey(key));
        }
        if token.is_none() && application_id.is_none() {
            return Err(SessionError::Configuration(
                "no credential provided: set an api key, a token or an application id".into(),
            ));
        }
        Ok(AuthMode::Bearer {
            token,
            application_id,
        })
    }
}

fn usable(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn redacted(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "Some(<redacted>)"
    } else {
        "None"
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &format_args!("{}", redacted(&self.api_key)))
            .field("token", &format_args!("{}", redacted(&self.token)))
            .field(
                "application_id",
                &format_args!("{}", redacted(&self.application_id)),
            )
            .finish()
    }
}

/// The authentication mode a session runs in, fixed at construction.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum AuthMode {
    ApiKey(String),
    Bearer {
        token: Option<String>,
        application_id: Option<String>,
    },
}

impl AuthMode {
    pub(crate) fn application_id(&self) -> Option<&str> {
        match self {
            AuthMode::ApiKey(_) => None,
            AuthMode::Bearer { application_id, .. } => application_id.as_deref(),
        }
    }
}

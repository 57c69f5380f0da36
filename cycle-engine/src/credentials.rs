use crate::types::{ClientConfig, EngineError, Result, SourceType};
use std::collections::HashMap;

/// Where credential values come from.
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads credentials from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialSource for EnvCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed key/value credentials, mostly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials {
    values: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// One credential field: the env suffix appended to `{credential_ref}_` and
/// the client config field it lands in.
struct CredentialField {
    suffix: &'static str,
    field: &'static str,
    default: Option<&'static str>,
    required: bool,
}

const fn required(suffix: &'static str, field: &'static str) -> CredentialField {
    CredentialField {
        suffix,
        field,
        default: None,
        required: true,
    }
}

const fn optional(suffix: &'static str, field: &'static str, default: Option<&'static str>) -> CredentialField {
    CredentialField {
        suffix,
        field,
        default,
        required: false,
    }
}

const REDDIT_FIELDS: &[CredentialField] = &[
    required("CLIENT_ID", "client_id"),
    required("CLIENT_SECRET", "client_secret"),
    optional("USER_AGENT", "user_agent", Some("Daigest/2.0")),
];

const TELEGRAM_FIELDS: &[CredentialField] = &[
    required("API_ID", "api_id"),
    required("API_HASH", "api_hash"),
    required("PHONE", "phone"),
    optional("PASSWORD", "password", None),
];

const TWITTER_FIELDS: &[CredentialField] = &[required("BEARER_TOKEN", "bearer_token")];

const GNEWS_FIELDS: &[CredentialField] = &[required("API_KEY", "api_key")];

fn fields_for(source_type: SourceType) -> &'static [CredentialField] {
    match source_type {
        SourceType::Reddit => REDDIT_FIELDS,
        SourceType::Telegram => TELEGRAM_FIELDS,
        SourceType::Twitter => TWITTER_FIELDS,
        SourceType::Gnews => GNEWS_FIELDS,
        SourceType::Youtube | SourceType::Pytrends => &[],
    }
}

/// Builds the client config for `source_type` from keys derived from
/// `credential_ref`. Empty values are treated as missing.
pub fn resolve(source: &dyn CredentialSource, source_type: SourceType, credential_ref: &str) -> Result<ClientConfig> {
    let mut config = ClientConfig::new();
    let mut missing = Vec::new();

    for field in fields_for(source_type) {
        let key = format!("{}_{}", credential_ref, field.suffix);
        match source.lookup(&key).filter(|v| !v.trim().is_empty()) {
            Some(value) => {
                config.insert(field.field.to_string(), value);
            }
            None if field.required => missing.push(key),
            None => {
                if let Some(default) = field.default {
                    config.insert(field.field.to_string(), default.to_string());
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(EngineError::CredentialMissing {
            source_name: source_type.display_name().to_string(),
            credential_ref: credential_ref.to_string(),
            missing: missing.join(", "),
        });
    }

    Ok(config)
}

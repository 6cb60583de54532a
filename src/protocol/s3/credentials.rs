//! Credentials selection for object-store clients

use std::fmt;

use crate::config::MinioConfig;

/// Environment variables checked for MinIO keys, in order
const MINIO_ENV_KEYS: [(&str, &str); 2] = [
    ("MINIO_ROOT_USER", "MINIO_ROOT_PASSWORD"),
    ("MINIO_ACCESS_KEY", "MINIO_SECRET_KEY"),
];

/// Where a client takes its credentials from
///
/// Chosen once when a client is built, never per request.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialsSource {
    /// Access/secret key pair from the configuration
    Static {
        access_key: String,
        secret_key: String,
    },

    /// Keys discovered in the process environment
    Environment,
}

impl CredentialsSource {
    /// Static credentials when both keys are configured, environment otherwise
    pub fn from_config(config: &MinioConfig) -> Self {
        match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => CredentialsSource::Static {
                access_key: access_key.clone(),
                secret_key: secret_key.clone(),
            },
            _ => CredentialsSource::Environment,
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, CredentialsSource::Static { .. })
    }

    pub fn access_key(&self) -> Option<&str> {
        match self {
            CredentialsSource::Static { access_key, .. } => Some(access_key),
            CredentialsSource::Environment => None,
        }
    }
}

impl fmt::Debug for CredentialsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsSource::Static { access_key, .. } => f
                .debug_struct("Static")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            CredentialsSource::Environment => f.write_str("Environment"),
        }
    }
}

/// Look up a MinIO key pair through `lookup`
///
/// Returns `None` when no complete pair is present, in which case the generic
/// AWS environment variables apply.
pub fn minio_environment_keys<F>(lookup: F) -> Option<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    MINIO_ENV_KEYS.iter().find_map(|(user_var, secret_var)| {
        let user = lookup(user_var).filter(|v| !v.is_empty())?;
        let secret = lookup(secret_var).filter(|v| !v.is_empty())?;
        Some((user, secret))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_static_when_both_keys_present() {
        let config = MinioConfig::new("http://localhost:9000", "files")
            .with_credentials("minioadmin", "secret");

        let source = CredentialsSource::from_config(&config);
        assert!(source.is_static());
        assert_eq!(source.access_key(), Some("minioadmin"));
    }

    #[test]
    fn test_environment_when_a_key_is_missing() {
        let mut config = MinioConfig::new("http://localhost:9000", "files");
        assert_eq!(
            CredentialsSource::from_config(&config),
            CredentialsSource::Environment
        );

        config.access_key = Some("only-access".to_string());
        assert_eq!(
            CredentialsSource::from_config(&config),
            CredentialsSource::Environment
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let source = CredentialsSource::Static {
            access_key: "AKIA".to_string(),
            secret_key: "super-secret".to_string(),
        };
        let rendered = format!("{:?}", source);
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn test_minio_environment_keys_order() {
        let vars: HashMap<&str, &str> = [
            ("MINIO_ROOT_USER", "root"),
            ("MINIO_ROOT_PASSWORD", "root-pass"),
            ("MINIO_ACCESS_KEY", "access"),
            ("MINIO_SECRET_KEY", "access-secret"),
        ]
        .into_iter()
        .collect();

        let keys = minio_environment_keys(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(keys, Some(("root".to_string(), "root-pass".to_string())));
    }

    #[test]
    fn test_minio_environment_keys_need_complete_pair() {
        let keys = minio_environment_keys(|name| {
            (name == "MINIO_ROOT_USER" || name == "MINIO_SECRET_KEY").then(|| "x".to_string())
        });
        assert_eq!(keys, None);
    }
}

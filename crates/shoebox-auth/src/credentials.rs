//! Secret lookup by access key.

use std::collections::HashMap;

use crate::error::AuthError;

/// Resolves the secret for an access key.
pub trait CredentialProvider: Send + Sync {
    /// Return the secret for `access_key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::AccessKeyNotFound`] if the key is not recognized.
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError>;
}

/// An in-memory credential table.
///
/// ```
/// use shoebox_auth::credentials::{CredentialProvider, StaticCredentialProvider};
///
/// let provider = StaticCredentialProvider::single("AKID", "secret");
/// assert_eq!(provider.get_secret_key("AKID").unwrap(), "secret");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, String>,
}

impl StaticCredentialProvider {
    /// Build from `(access_key_id, secret)` pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }

    /// Build a table holding one shared secret.
    pub fn single(access_key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::new([(access_key_id.into(), secret_key.into())])
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get_secret_key(&self, access_key_id: &str) -> Result<String, AuthError> {
        self.credentials
            .get(access_key_id)
            .cloned()
            .ok_or_else(|| AuthError::AccessKeyNotFound(access_key_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_resolve_known_access_key() {
        let provider = StaticCredentialProvider::new(vec![
            ("a".to_owned(), "1".to_owned()),
            ("b".to_owned(), "2".to_owned()),
        ]);
        assert_eq!(provider.get_secret_key("b").unwrap(), "2");
    }

    #[test]
    fn test_should_reject_unknown_access_key() {
        let provider = StaticCredentialProvider::single("a", "1");
        assert!(matches!(
            provider.get_secret_key("z"),
            Err(AuthError::AccessKeyNotFound(k)) if k == "z"
        ));
    }
}

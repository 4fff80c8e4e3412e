//! Site, user and upload item models.

use std::fmt;
use std::path::PathBuf;

/// Credentials and identity used on a remote site.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub login: String,
    pub password: String,
    /// Name used when rendering descriptions (attribution, author fields).
    pub display_name: String,
}
impl User {
    pub fn new(login: impl Into<String>, password: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            display_name: display_name.into(),
        }
    }
}
impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// A configured remote hosting site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Configuration key, unique among configured sites.
    pub key: String,
    /// Human-readable name (used for logging).
    pub name: String,
    /// API endpoint of the site.
    pub url: String,
    pub user: User,
}

/// Everything a session needs to upload one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Absolute path of the local file.
    pub path: PathBuf,
    /// Name the file should have on the remote site.
    pub file_name: String,
    /// Rendered description page text.
    pub description: String,
    /// Edit summary attached to the upload.
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let user = User::new("alice", "hunter2", "Alice");
        let debug = format!("{user:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}

//! Configuration loading and validation.
//!
//! Configuration is layered with [figment]: built-in defaults, then a config
//! file (TOML, YAML or JSON), then `PIXPORT_`-prefixed environment variables.
//! Nested keys are separated by a double underscore in the environment, so
//! `PIXPORT_SITES__COMMONS__USER__PASSWORD` sets `sites.commons.user.password`.
//!
//! ```toml
//! workers = 4
//! active_site = "commons"
//!
//! [sites.commons]
//! name = "Wikimedia Commons"
//! url = "https://commons.wikimedia.org/w/api.php"
//! user = { login = "alice", password = "secret", display_name = "Alice" }
//!
//! [template]
//! name = "information"
//! path = "templates/information.txt"
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use pixport_session::{Site, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::instrument;

const ENV_PREFIX: &str = "PIXPORT_";
const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Size of the shared worker pool used for both ingestion and uploads.
    pub workers: usize,
    /// Key (in [`sites`](Self::sites)) of the site uploads go to.
    pub active_site: Option<String>,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteConfig>,
    /// Default description template; the built-in one is used when omitted.
    pub template: Option<TemplateConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display name; defaults to the site key.
    pub name: Option<String>,
    pub url: String,
    pub user: UserConfig,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub login: String,
    pub password: String,
    /// Name used in rendered descriptions; defaults to the login.
    pub display_name: Option<String>,
}
impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// A template either given inline (`text`) or read from `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub text: Option<String>,
    pub path: Option<PathBuf>,
}

/// Template source resolved from a [`TemplateConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateText {
    pub name: String,
    pub description: String,
    pub text: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            active_site: None,
            sites: BTreeMap::new(),
            template: None,
        }
    }
}

impl Config {
    /// Loads configuration from the platform configuration directory
    /// (`config.toml`, `config.yaml` and `config.json`, all optional) and the
    /// environment, then validates it.
    #[instrument]
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(dirs) = ProjectDirs::from("org", "pixport", "pixport") {
            let dir = dirs.config_dir();
            tracing::debug!(dir = %dir.display(), "Looking for configuration files");
            figment = figment
                .merge(Toml::file(dir.join("config.toml")))
                .merge(Yaml::file(dir.join("config.yaml")))
                .merge(Json::file(dir.join("config.json")));
        }
        Self::finish(figment)
    }

    /// Loads configuration from an explicit file (format chosen by
    /// extension, TOML by default) and the environment, then validates it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let figment = Figment::from(Serialized::defaults(Config::default()));
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
        Self::finish(figment)
    }

    fn finish(figment: Figment) -> Result<Self> {
        let config: Config =
            figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(workers = config.workers, sites = config.sites.len(), "Configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            exn::bail!(ErrorKind::InvalidWorkers(self.workers));
        }
        self.active()?;
        Ok(())
    }

    /// The configured site for `key`.
    pub fn site(&self, key: &str) -> Option<Site> {
        let site = self.sites.get(key)?;
        Some(Site {
            key: key.to_string(),
            name: site.name.clone().unwrap_or_else(|| key.to_string()),
            url: site.url.clone(),
            user: User {
                login: site.user.login.clone(),
                password: site.user.password.clone(),
                display_name: site.user.display_name.clone().unwrap_or_else(|| site.user.login.clone()),
            },
        })
    }

    /// Every configured site, ordered by key.
    pub fn sites(&self) -> Vec<Site> {
        self.sites.keys().filter_map(|key| self.site(key)).collect()
    }

    /// The active site. Fails with [`ErrorKind::InvalidActiveSite`] if none is
    /// configured or the key is unknown.
    pub fn active(&self) -> Result<Site> {
        let Some(key) = &self.active_site else {
            exn::bail!(ErrorKind::InvalidActiveSite("<none>".to_string()));
        };
        match self.site(key) {
            Some(site) => Ok(site),
            None => exn::bail!(ErrorKind::InvalidActiveSite(key.clone())),
        }
    }

    /// Resolves the configured template, reading it from disk if needed.
    /// `None` means the built-in default should be used.
    pub fn template(&self) -> Result<Option<TemplateText>> {
        let Some(template) = &self.template else {
            return Ok(None);
        };
        let text = match (&template.text, &template.path) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => {
                std::fs::read_to_string(path).or_raise(|| ErrorKind::TemplateUnreadable(path.clone()))?
            },
            (None, None) => return Ok(None),
        };
        Ok(Some(TemplateText {
            name: template.name.clone(),
            description: template.description.clone(),
            text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    const TOML: &str = r#"
        workers = 2
        active_site = "commons"

        [sites.commons]
        name = "Wikimedia Commons"
        url = "https://commons.wikimedia.org/w/api.php"
        user = { login = "alice", password = "secret", display_name = "Alice" }

        [sites.test]
        url = "https://test.wikipedia.org/w/api.php"
        user = { login = "bob", password = "hunter2" }
    "#;

    #[test]
    fn test_load_toml() {
        Jail::expect_with(|jail| {
            jail.create_file("pixport.toml", TOML)?;
            let config = Config::load_from("pixport.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.workers, 2);
            let active = config.active().map_err(|e| e.to_string())?;
            assert_eq!(active.name, "Wikimedia Commons");
            assert_eq!(active.user.display_name, "Alice");
            Ok(())
        });
    }

    #[test]
    fn test_site_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("pixport.toml", TOML)?;
            let config = Config::load_from("pixport.toml").map_err(|e| e.to_string())?;
            let site = config.site("test").ok_or("missing site")?;
            assert_eq!(site.name, "test");
            assert_eq!(site.user.display_name, "bob");
            assert_eq!(config.sites().len(), 2);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("pixport.toml", TOML)?;
            jail.set_env("PIXPORT_WORKERS", "8");
            jail.set_env("PIXPORT_ACTIVE_SITE", "test");
            jail.set_env("PIXPORT_SITES__TEST__USER__PASSWORD", "from-env");
            let config = Config::load_from("pixport.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.workers, 8);
            let active = config.active().map_err(|e| e.to_string())?;
            assert_eq!(active.key, "test");
            assert_eq!(active.user.password, "from-env");
            Ok(())
        });
    }

    #[test]
    fn test_load_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pixport.yaml",
                "active_site: local\nsites:\n  local:\n    url: http://localhost/api.php\n    user:\n      login: carol\n      password: pw\n",
            )?;
            let config = Config::load_from("pixport.yaml").map_err(|e| e.to_string())?;
            assert_eq!(config.workers, DEFAULT_WORKERS);
            assert_eq!(config.active().map_err(|e| e.to_string())?.user.login, "carol");
            Ok(())
        });
    }

    #[rstest]
    #[case("workers = 0\nactive_site = \"x\"\n[sites.x]\nurl = \"u\"\nuser = { login = \"l\", password = \"p\" }", ErrorKind::InvalidWorkers(0))]
    #[case("workers = 1", ErrorKind::InvalidActiveSite("<none>".to_string()))]
    #[case("active_site = \"missing\"", ErrorKind::InvalidActiveSite("missing".to_string()))]
    fn test_validation(#[case] toml: &str, #[case] expected: ErrorKind) {
        // Jail serialises environment access with the tests that set variables.
        Jail::expect_with(|jail| {
            jail.create_file("pixport.toml", toml)?;
            let err = Config::load_from("pixport.toml").err().ok_or("configuration should be invalid")?;
            assert_eq!(*err, expected);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load_from("/definitely/not/here.toml").unwrap_err();
        assert_eq!(*err, ErrorKind::NotFound(PathBuf::from("/definitely/not/here.toml")));
    }

    #[test]
    fn test_template_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("information.txt");
        std::fs::write(&path, "{{ file_name }}").unwrap();
        let config = Config {
            template: Some(TemplateConfig {
                name: "information".to_string(),
                description: String::new(),
                text: None,
                path: Some(path.clone()),
            }),
            ..Config::default()
        };
        let template = config.template().unwrap().unwrap();
        assert_eq!(template.text, "{{ file_name }}");

        std::fs::remove_file(&path).unwrap();
        assert_eq!(*config.template().unwrap_err(), ErrorKind::TemplateUnreadable(path));
    }

    #[test]
    fn test_no_template_uses_default() {
        assert_eq!(Config::default().template().unwrap(), None);
    }
}

//! Configuration Management
//!
//! Saved repositories and resolution of command line repository arguments

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::resolver::normalize_project_path;

/// Default configuration file name, looked up in the home directory
pub const CONFIG_FILE_NAME: &str = ".gl-labeler.yml";

/// Environment variable holding the GitLab URL
pub const URL_ENV: &str = "GITLAB_URL";

/// Environment variable holding the GitLab token
pub const TOKEN_ENV: &str = "GITLAB_TOKEN";

/// Saved Repository
///
/// A repository URL (instance URL plus project path) and its token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepoConfig {
    /// Repository URL (e.g. `https://gitlab.com/group/repo`)
    pub url: String,

    /// GitLab token
    #[serde(default)]
    pub token: String,
}

/// Application Configuration
///
/// Contents of the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Saved repositories by name
    #[serde(default)]
    pub repos: BTreeMap<String, RepoConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file
    ///
    /// A missing file yields an empty configuration.
    ///
    /// # Errors
    /// If the file exists but cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write configuration to a YAML file
    ///
    /// # Errors
    /// If serialization or writing fails
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a saved repository by name
    pub fn get(&self, name: &str) -> Option<&RepoConfig> {
        self.repos.get(name)
    }

    /// Save a repository under a name, replacing any previous entry
    pub fn insert<S: Into<String>>(&mut self, name: S, repo: RepoConfig) {
        self.repos.insert(name.into(), repo);
    }
}

/// Default configuration file location (`~/.gl-labeler.yml`)
///
/// # Errors
/// If the home directory cannot be determined
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .ok_or_else(|| Error::config_validation("Cannot determine the home directory"))
}

/// Repository Target
///
/// A repository to operate on, before connecting to GitLab
#[derive(Debug, Clone, PartialEq)]
pub struct RepoTarget {
    /// Name in the configuration file, if it came from there
    pub name: Option<String>,

    /// Repository URL including the project path
    pub url: Url,

    /// GitLab token
    pub token: String,
}

impl RepoTarget {
    /// Resolve a repository argument
    ///
    /// A name saved in `config` wins, taking `token` only when the saved
    /// token is empty. Otherwise `url` is used as given and, when
    /// `name_or_path` is not empty, its path is replaced by it.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration
    /// - `name_or_path`: Saved repository name or `group/repo` path (may be empty)
    /// - `url`: Repository or instance URL from flags/environment
    /// - `token`: Token from flags/environment
    ///
    /// # Errors
    /// If no usable URL is available or the target is not a valid repository
    pub fn from_config(
        config: &AppConfig,
        name_or_path: &str,
        url: Option<&str>,
        token: Option<&str>,
    ) -> Result<Self> {
        if let Some(saved) = config.get(name_or_path) {
            let token = if saved.token.trim().is_empty() {
                token.unwrap_or_default()
            } else {
                saved.token.as_str()
            };
            let target = Self {
                name: Some(name_or_path.to_string()),
                url: parse_url(&saved.url)?,
                token: token.to_string(),
            };
            target.validate()?;
            return Ok(target);
        }

        let raw_url = url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::config_validation(empty_url_message(name_or_path)))?;
        let mut parsed = parse_url(raw_url)?;
        if !name_or_path.is_empty() {
            parsed.set_path(normalize_project_path(name_or_path));
        }

        let target = Self {
            name: None,
            url: parsed,
            token: token.unwrap_or_default().to_string(),
        };
        target.validate()?;
        Ok(target)
    }

    /// Another repository on the same instance, with the same token
    ///
    /// # Errors
    /// If `path` is not a `group/repo` path
    pub fn sibling(&self, path: &str) -> Result<Self> {
        let mut url = self.instance_url();
        url.set_path(normalize_project_path(path));
        let target = Self {
            name: None,
            url,
            token: self.token.clone(),
        };
        target.validate()?;
        Ok(target)
    }

    /// Validate the target
    ///
    /// # Errors
    /// - If the URL has no host
    /// - If the path is not in `group/repo` form
    /// - If no token is set
    pub fn validate(&self) -> Result<()> {
        if self.url.host_str().map_or(true, str::is_empty) {
            return Err(Error::config_validation(format!(
                "Repository URL has no host: {}",
                self.url
            )));
        }

        let path = self.project_path();
        match path.rsplit_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => {}
            _ => return Err(Error::InvalidRepositoryFormat(path.to_string())),
        }

        if self.token.trim().is_empty() {
            return Err(Error::config_validation(format!(
                "GitLab token is required. Set via --token or the {} env var",
                TOKEN_ENV
            )));
        }

        Ok(())
    }

    /// Project path (e.g. `group/repo`)
    pub fn project_path(&self) -> &str {
        normalize_project_path(self.url.path().trim_end_matches('/'))
    }

    /// Instance URL without the project path
    pub fn instance_url(&self) -> Url {
        let mut url = self.url.clone();
        url.set_path("");
        url.set_query(None);
        url.set_fragment(None);
        url
    }

    /// Convert into the form saved in the configuration file
    pub fn to_repo_config(&self) -> RepoConfig {
        RepoConfig {
            url: self.url.to_string(),
            token: self.token.clone(),
        }
    }
}

impl fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n  url: {}\n  token: {}",
            self.name.as_deref().unwrap_or(""),
            self.url,
            self.token
        )
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|source| Error::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

fn empty_url_message(name_or_path: &str) -> String {
    if name_or_path.is_empty() {
        format!(
            "Repository is required. Use --repo with a saved name, or --url (or {})",
            URL_ENV
        )
    } else {
        format!(
            "'{}' is not a saved repository and no --url (or {}) was given",
            name_or_path, URL_ENV
        )
    }
}

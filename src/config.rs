use quire_core::{
    Author, BackendSettings, GitRemote, GitSettings, LocalSettings, RemoteSettings, StorageMode,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Remote repository settings for github mode
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    /// API host, for self-hosted instances
    pub api_url: Option<String>,
}

/// Embedded repository settings for local-git mode
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocalGitConfig {
    pub branch: Option<String>,
    pub remote_url: Option<String>,
    pub remote_name: Option<String>,
    /// Push after every commit (default: false)
    #[serde(default)]
    pub auto_push: bool,
}

/// Access tokens. Kept out of the config record and never serialized.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub git_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("git_token", &self.git_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub mode: ConfigValue<StorageMode>,
    pub author_name: ConfigValue<String>,
    pub author_email: ConfigValue<String>,
    /// SQLite database for local mode
    pub database_path: ConfigValue<PathBuf>,
    /// Bare repository for local-git mode
    pub repo_dir: ConfigValue<PathBuf>,
    pub github: GithubConfig,
    pub local_git: LocalGitConfig,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct AuthorSection {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LocalSection {
    database_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LocalGitSection {
    repo_dir: Option<PathBuf>,
    #[serde(flatten)]
    rest: LocalGitConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    mode: Option<String>,
    author: AuthorSection,
    github: GithubConfig,
    local: LocalSection,
    local_git: LocalGitSection,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(config_path, |key| std::env::var(key).ok())
    }

    fn load_with_env(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Author::default();
        let data_dir = Self::default_data_dir();

        // Start with defaults
        let mut mode = ConfigValue::new(StorageMode::Local, ConfigSource::Default);
        let mut author_name = ConfigValue::new(defaults.name, ConfigSource::Default);
        let mut author_email = ConfigValue::new(defaults.email, ConfigSource::Default);
        let mut database_path = ConfigValue::new(data_dir.join("quire.db"), ConfigSource::Default);
        let mut repo_dir = ConfigValue::new(data_dir.join("repo.git"), ConfigSource::Default);
        let mut github = GithubConfig::default();
        let mut local_git = LocalGitConfig::default();
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(m) = file_config.mode {
                mode = ConfigValue::new(parse_mode(&m)?, ConfigSource::File);
            }
            if let Some(name) = file_config.author.name {
                author_name = ConfigValue::new(name, ConfigSource::File);
            }
            if let Some(email) = file_config.author.email {
                author_email = ConfigValue::new(email, ConfigSource::File);
            }
            if let Some(db_path) = file_config.local.database_path {
                database_path = ConfigValue::new(resolve(&path, db_path), ConfigSource::File);
            }
            if let Some(dir) = file_config.local_git.repo_dir {
                repo_dir = ConfigValue::new(resolve(&path, dir), ConfigSource::File);
            }
            github = file_config.github;
            local_git = file_config.local_git.rest;
        }

        // Apply environment variable overrides
        if let Some(m) = env("QUIRE_MODE") {
            mode = ConfigValue::new(parse_mode(&m)?, ConfigSource::Environment);
        }
        if let Some(name) = env("QUIRE_AUTHOR_NAME") {
            author_name = ConfigValue::new(name, ConfigSource::Environment);
        }
        if let Some(email) = env("QUIRE_AUTHOR_EMAIL") {
            author_email = ConfigValue::new(email, ConfigSource::Environment);
        }
        if let Some(db_path) = env("QUIRE_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Some(dir) = env("QUIRE_REPO_DIR") {
            repo_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }

        let credentials_path = path
            .parent()
            .map(|p| p.join("credentials.yaml"))
            .unwrap_or_else(|| Self::default_config_dir().join("credentials.yaml"));
        let mut credentials = load_credentials(&credentials_path)?;
        if let Some(token) = env("QUIRE_GITHUB_TOKEN") {
            credentials.github_token = Some(token);
        }
        if let Some(token) = env("QUIRE_GIT_TOKEN") {
            credentials.git_token = Some(token);
        }

        Ok(Self {
            mode,
            author_name,
            author_email,
            database_path,
            repo_dir,
            github,
            local_git,
            config_file,
            credentials,
        })
    }

    pub fn author(&self) -> Author {
        Author {
            name: self.author_name.value.clone(),
            email: self.author_email.value.clone(),
        }
    }

    /// Settings for the backend selected by `mode`. Missing values are left
    /// empty for the backend's own validation to report.
    pub fn backend_settings(&self) -> BackendSettings {
        match self.mode.value {
            StorageMode::Github => {
                let github = &self.github;
                let mut settings = RemoteSettings::new(
                    github.owner.clone().unwrap_or_default(),
                    github.repo.clone().unwrap_or_default(),
                    self.credentials.github_token.clone().unwrap_or_default(),
                );
                if let Some(branch) = &github.branch {
                    settings = settings.with_branch(branch);
                }
                if let Some(api_url) = &github.api_url {
                    settings = settings.with_api_url(api_url);
                }
                BackendSettings::Remote(settings)
            }
            StorageMode::LocalGit => {
                let git = &self.local_git;
                let mut settings = GitSettings::new(&self.repo_dir.value)
                    .with_author(self.author())
                    .with_auto_push(git.auto_push);
                if let Some(branch) = &git.branch {
                    settings = settings.with_branch(branch);
                }
                if let Some(url) = &git.remote_url {
                    let mut remote = GitRemote::new(url);
                    if let Some(name) = &git.remote_name {
                        remote.name = name.clone();
                    }
                    if let Some(token) = &self.credentials.git_token {
                        remote = remote.with_token(token);
                    }
                    settings = settings.with_remote(remote);
                }
                BackendSettings::Git(settings)
            }
            StorageMode::Local => BackendSettings::Local(
                LocalSettings::new(&self.database_path.value).with_author(self.author()),
            ),
        }
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/quire/
    /// - macOS: ~/Library/Application Support/quire/
    /// - Windows: %APPDATA%/quire/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quire")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/quire/
    /// - macOS: ~/Library/Application Support/quire/
    /// - Windows: %APPDATA%/quire/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quire")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

fn parse_mode(value: &str) -> Result<StorageMode, ConfigError> {
    StorageMode::parse(value).ok_or_else(|| ConfigError::InvalidMode(value.to_string()))
}

/// Resolve relative paths against the config file's directory
fn resolve(config_file: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        config_file.parent().map(|p| p.join(&path)).unwrap_or(path)
    } else {
        path
    }
}

fn load_credentials(path: &Path) -> Result<Credentials, ConfigError> {
    if !path.exists() {
        return Ok(Credentials::default());
    }
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseError(path.to_path_buf(), e))
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidMode(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidMode(mode) => write!(
                f,
                "Unknown storage mode '{}' (expected github, local or local-git)",
                mode
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

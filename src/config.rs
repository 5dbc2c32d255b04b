use clap::{Args, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Which backend to talk to
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,
}

#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// SQLite database and uploads directory under the data dir
    #[default]
    Local,
    /// Hosted project reached over HTTP
    Remote,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub remote: RemoteConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub images: ImagesConfig,
    pub posts: PostsConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub bucket: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
    /// URL the uploads directory is served from; `file://` URLs otherwise.
    pub public_base_url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
    pub session_file: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    pub max_per_post: usize,
    /// Images above this size are recompressed before upload.
    pub compress_threshold_mb: u64,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PostsConfig {
    pub title_max_chars: usize,
    pub content_max_chars: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            bucket: "PostImages".to_string(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_hours: 720,
            session_file: None,
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_per_post: 3,
            compress_threshold_mb: 3,
        }
    }
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            title_max_chars: 40,
            content_max_chars: 200,
        }
    }
}

impl ImagesConfig {
    pub fn compress_threshold_bytes(&self) -> u64 {
        self.compress_threshold_mb * 1024 * 1024
    }
}

impl Config {
    pub fn load(args: &GlobalArgs) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(args);
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(kind) = args.backend {
            config.backend.kind = kind;
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("avera.db"));
        }
        if config.storage.path.is_none() {
            config.storage.path = Some(data_dir.join("uploads"));
        }
        if config.auth.session_file.is_none() {
            config.auth.session_file = Some(data_dir.join("session"));
        }

        if config.backend.kind == BackendKind::Remote
            && (config.remote.url.is_none() || config.remote.anon_key.is_none())
        {
            anyhow::bail!("the remote backend needs [remote] url and anon_key");
        }

        Ok(config)
    }

    pub fn data_dir(args: &GlobalArgs) -> PathBuf {
        args.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".avera")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database.path.clone().unwrap_or_else(|| PathBuf::from("avera.db"))
    }

    pub fn uploads_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| PathBuf::from("uploads"))
    }

    pub fn session_file(&self) -> PathBuf {
        self.auth
            .session_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("session"))
    }
}

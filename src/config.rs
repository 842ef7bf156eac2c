use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt};

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use engine_bridge::{BridgeSettings, LineFilter};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

pub const DATABASE_VERSION: &str = "ANNOTATOR_DATABASE_VERSION";
pub const GENE_BUILD_VERSION: &str = "ANNOTATOR_GENE_BUILD_VERSION";
pub const MAX_FILE_SIZE_MB: &str = "ANNOTATOR_MAX_FILE_SIZE_MB";
pub const REFERENCE_GENOME_VERSION: &str = "ANNOTATOR_REFERENCE_GENOME_VERSION";
pub const RESOURCE_DIR: &str = "ANNOTATOR_RESOURCE_DIR";
pub const RESOURCE_URL: &str = "ANNOTATOR_RESOURCE_URL";
pub const ENGINE_VERSION: &str = "ANNOTATOR_VERSION";
pub const PREDICTION_TIMEOUT_SECS: &str = "ANNOTATOR_PREDICTION_TIMEOUT_SECS";
pub const QUEUE_CAPACITY: &str = "ANNOTATOR_QUEUE_CAPACITY";
pub const JVM_OPTIONS: &str = "ANNOTATOR_JVM_OPTIONS";
pub const EXTRA_BANNERS: &str = "ANNOTATOR_EXTRA_BANNERS";
pub const JAVA_HOME: &str = "JAVA_HOME";

/// Source of configuration values.
#[async_trait]
pub trait ConfigManagerType: Send + Sync {
    async fn keys(&self) -> Vec<String>;
    async fn get(&self, key: &str) -> Option<String>;
    fn clone_box(&self) -> Box<dyn ConfigManagerType>;
    fn debug_box(&self) -> String;
}

pub struct ConfigManager(pub Box<dyn ConfigManagerType>);

impl ConfigManager {
    pub fn into_inner(self) -> Box<dyn ConfigManagerType> {
        self.0
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).await
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        ConfigManager(self.0.clone_box())
    }
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.debug_box())
    }
}

/// Process environment, optionally seeded from a `.env` file.
#[derive(Clone, Debug)]
pub struct EnvConfigManager {
    env_file: Option<PathBuf>,
}

impl EnvConfigManager {
    pub fn new(env_file: Option<PathBuf>) -> Box<Self> {
        match &env_file {
            Some(path) if path.exists() => match dotenvy::from_path(path) {
                Ok(()) => info!("Loaded .env from {}", path.display()),
                Err(err) => warn!("could not load .env from {}: {err}", path.display()),
            },
            Some(path) => warn!("could not load .env from {}", path.display()),
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    debug!("Loaded .env from {}", path.display());
                }
            }
        }
        Box::new(Self { env_file })
    }
}

#[async_trait]
impl ConfigManagerType for EnvConfigManager {
    async fn keys(&self) -> Vec<String> {
        env::vars().map(|(k, _)| k).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        match &self.env_file {
            Some(path) => format!("EnvConfigManager({})", path.display()),
            None => "EnvConfigManager".to_string(),
        }
    }
}

/// In-memory configuration, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MapConfigManager {
    map: DashMap<String, String>,
}

impl MapConfigManager {
    pub fn new() -> Box<Self> {
        Box::new(Self::default())
    }

    pub fn with(self: Box<Self>, key: &str, value: &str) -> Box<Self> {
        self.map.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl ConfigManagerType for MapConfigManager {
    async fn keys(&self) -> Vec<String> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.value().clone())
    }

    fn clone_box(&self) -> Box<dyn ConfigManagerType> {
        Box::new(self.clone())
    }

    fn debug_box(&self) -> String {
        "MapConfigManager".to_string()
    }
}

/// Everything a run needs to locate resources and drive the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorProperties {
    pub database_version: String,
    pub gene_build_version: String,
    pub max_file_size_mb: u64,
    pub reference_genome_version: String,
    pub resource_dir: PathBuf,
    pub resource_url: Url,
    /// SnpEff release, used to locate the jar.
    pub version: String,
    pub prediction_timeout_secs: u64,
    pub queue_capacity: usize,
    pub jvm_options: Vec<String>,
    /// Engine stdout lines to drop besides `#` comments.
    pub extra_banners: Vec<String>,
    pub java_home: Option<PathBuf>,
}

impl Default for AnnotatorProperties {
    fn default() -> Self {
        Self {
            database_version: "3.6c-GRCh37.75".to_string(),
            gene_build_version: "75".to_string(),
            max_file_size_mb: 512,
            reference_genome_version: "GRCh37.75.v1".to_string(),
            resource_dir: PathBuf::from("/tmp/dcc-release"),
            resource_url: Url::parse(
                "https://artifacts.oicr.on.ca/artifactory/simple/dcc-dependencies/org/icgc/dcc",
            )
            .expect("static resource url"),
            version: "3.6c".to_string(),
            prediction_timeout_secs: 5 * 60,
            queue_capacity: engine_bridge::bridge::DEFAULT_QUEUE_CAPACITY,
            jvm_options: vec!["-Xmx4g".to_string()],
            extra_banners: vec![],
            java_home: None,
        }
    }
}

impl AnnotatorProperties {
    /// Defaults, overridden by whatever `config` knows about.
    pub async fn load(config: &ConfigManager) -> Result<Self> {
        let mut props = Self::default();

        if let Some(v) = config.get(DATABASE_VERSION).await {
            props.database_version = v;
        }
        if let Some(v) = config.get(GENE_BUILD_VERSION).await {
            props.gene_build_version = v;
        }
        if let Some(v) = parsed(config, MAX_FILE_SIZE_MB).await? {
            props.max_file_size_mb = v;
        }
        if let Some(v) = config.get(REFERENCE_GENOME_VERSION).await {
            props.reference_genome_version = v;
        }
        if let Some(v) = config.get(RESOURCE_DIR).await {
            props.resource_dir = PathBuf::from(v);
        }
        if let Some(v) = parsed(config, RESOURCE_URL).await? {
            props.resource_url = v;
        }
        if let Some(v) = config.get(ENGINE_VERSION).await {
            props.version = v;
        }
        if let Some(v) = parsed(config, PREDICTION_TIMEOUT_SECS).await? {
            props.prediction_timeout_secs = v;
        }
        if let Some(v) = parsed(config, QUEUE_CAPACITY).await? {
            props.queue_capacity = v;
        }
        if let Some(v) = config.get(JVM_OPTIONS).await {
            props.jvm_options = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = config.get(EXTRA_BANNERS).await {
            props.extra_banners = v
                .split('|')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = config.get(JAVA_HOME).await {
            props.java_home = Some(PathBuf::from(v));
        }

        if props.queue_capacity == 0 {
            anyhow::bail!("{QUEUE_CAPACITY} must be at least 1");
        }
        Ok(props)
    }

    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_secs(self.prediction_timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    pub fn bridge_settings(&self) -> Result<BridgeSettings> {
        let mut banners = vec![engine_bridge::drain::PEDIGREE_BANNER.to_string()];
        banners.extend(self.extra_banners.iter().cloned());
        let filter = LineFilter::new(&banners).context("invalid engine banner pattern")?;
        Ok(BridgeSettings {
            prediction_timeout: self.prediction_timeout(),
            queue_capacity: self.queue_capacity,
            filter,
            ..Default::default()
        })
    }
}

async fn parsed<T>(config: &ConfigManager, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match config.get(key).await {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value `{raw}` for {key}")),
        None => Ok(None),
    }
}

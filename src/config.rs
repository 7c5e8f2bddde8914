use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use ron::{Options, extensions::Extensions};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CONFIG_VERSION,
    bundle::{Bundle, Range, ValueKind},
    error::ConfigurationError,
    id::{EncodedId, Layout},
    poller::{EntityConfig, EntityKind, PollerConfig, PollingMode, entity::map_options, schedule},
    protocol::{self, Connection},
};

pub const CONFIG_ENV: &str = "CLIMATIX_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./config.ron";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing config: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("wrong config version, got {got}, expected {expected}")]
    Version { got: f32, expected: f32 },
    #[error("bundle {path} is not JSON: {source}")]
    Bundle { path: String, source: serde_json::Error },
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClimatixConfig {
    pub version: f32,
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HostConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub pin: Option<String>,
    /// seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_ids")]
    pub max_ids_per_request: usize,
    #[serde(default = "default_threshold")]
    pub poll_threshold: u32,
    #[serde(default = "default_layout")]
    pub layout: Layout,
    #[serde(default)]
    pub language: Option<String>,
    /// path to the downloaded bundle JSON
    #[serde(default)]
    pub bundle: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntitySpec>,
}

#[derive(Debug, Deserialize, Serialize)]
pub enum EntitySpec {
    Manual(ManualEntity),
    Bundle(BundleEntity),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManualEntity {
    pub key: String,
    pub name: Option<String>,
    pub layout: Option<Layout>,
    pub read_id: String,
    pub write_id: Option<String>,
    #[serde(default)]
    pub kind: ValueKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    #[serde(default)]
    pub options: Vec<OptionSpec>,
    pub unit: Option<String>,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub polling: PollingMode,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OptionSpec {
    pub label: String,
    pub value: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BundleEntity {
    pub key: String,
    /// replaces the bundle's label
    pub name: Option<String>,
    /// substring of the binding name
    pub filter: String,
    /// substring of the context path
    pub context: Option<String>,
    /// index among the usable matches
    #[serde(default)]
    pub pick: usize,
    pub layout: Option<Layout>,
    #[serde(default)]
    pub polling: PollingMode,
}

fn default_port() -> u16 {
    protocol::DEFAULT_PORT
}

fn default_username() -> String {
    protocol::DEFAULT_USERNAME.to_string()
}

fn default_password() -> String {
    protocol::DEFAULT_PASSWORD.to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    protocol::DEFAULT_TIMEOUT.as_secs()
}

fn default_max_ids() -> usize {
    crate::poller::DEFAULT_MAX_IDS_PER_REQUEST
}

fn default_threshold() -> u32 {
    schedule::DEFAULT_THRESHOLD
}

fn default_layout() -> Layout {
    Layout::Generic
}

/// `$CLIMATIX_CONFIG`, else `./config.ron`
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl ClimatixConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&s)
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let options = Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES);
        let cfg: Self = options.from_str(s)?;

        if cfg.version != CONFIG_VERSION {
            return Err(ConfigError::Version {
                got: cfg.version,
                expected: CONFIG_VERSION,
            });
        }
        Ok(cfg)
    }
}

impl HostConfig {
    pub fn connection(&self) -> Connection {
        Connection {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            pin: self.pin.clone(),
            timeout: Duration::from_secs(self.timeout),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            name: self.name.clone(),
            period: Duration::from_secs(self.poll_interval.max(1)),
            timeout: Duration::from_secs(self.timeout),
            max_ids_per_request: self.max_ids_per_request,
            threshold: self.poll_threshold,
        }
    }

    pub fn load_bundle(&self) -> Result<Option<Bundle>, ConfigError> {
        let Some(path) = &self.bundle else {
            return Ok(None);
        };
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let bundle = Bundle::from_json(&s, self.language.as_deref()).map_err(|source| ConfigError::Bundle {
            path: path.clone(),
            source,
        })?;
        Ok(Some(bundle))
    }

    /// One result per declared entity, in declaration order.
    pub fn build_entities(&self, bundle: Option<&Bundle>) -> Vec<Result<EntityConfig, ConfigurationError>> {
        self.entities
            .iter()
            .map(|spec| match spec {
                EntitySpec::Manual(m) => m.build(self.layout),
                EntitySpec::Bundle(b) => b.build(bundle, self.layout),
            })
            .collect()
    }
}

impl EntitySpec {
    pub fn key(&self) -> &str {
        match self {
            EntitySpec::Manual(m) => &m.key,
            EntitySpec::Bundle(b) => &b.key,
        }
    }
}

impl ManualEntity {
    pub fn build(&self, default_layout: Layout) -> Result<EntityConfig, ConfigurationError> {
        let layout = self.layout.unwrap_or(default_layout);
        let parse = |text: &str| {
            EncodedId::parse(layout, text).map_err(|e| ConfigurationError::InvalidId(self.key.clone(), e))
        };

        let read_id = parse(&self.read_id)?;
        let write_id = self.write_id.as_deref().map(parse).transpose()?;

        let kind = match self.kind {
            ValueKind::Analog => EntityKind::Analog {
                range: match (self.min, self.max) {
                    (Some(min), Some(max)) => Some(Range { min, max }),
                    _ => None,
                },
                step: self.step,
            },
            ValueKind::Digital => EntityKind::Digital,
            ValueKind::Enumerated => {
                let declared = self.options.iter().map(|o| (o.label.clone(), o.value)).collect();
                EntityKind::Enumerated {
                    options: map_options(&self.key, declared)?,
                }
            }
        };

        let entity = EntityConfig {
            key: self.key.clone(),
            name: self.name.clone().unwrap_or_else(|| self.key.clone()),
            read_id,
            write_id,
            kind,
            unit: self.unit.clone(),
            readonly: self.readonly,
            polling: self.polling,
        };
        entity.validate()?;
        Ok(entity)
    }
}

impl BundleEntity {
    pub fn build(&self, bundle: Option<&Bundle>, default_layout: Layout) -> Result<EntityConfig, ConfigurationError> {
        let bundle = bundle.ok_or_else(|| ConfigurationError::MissingBundle(self.key.clone()))?;
        let layout = self.layout.unwrap_or(default_layout);

        let search = bundle.search(Some(&self.filter), self.context.as_deref());
        let usable: Vec<_> = search.iter().filter(|b| b.is_usable(layout)).collect();
        if usable.is_empty() {
            return Err(ConfigurationError::NoMatchingBinding {
                name: self.filter.clone(),
                context: self.context.clone().unwrap_or_default(),
            });
        }

        let binding = usable.get(self.pick).ok_or(ConfigurationError::PickOutOfRange {
            pick: self.pick,
            found: usable.len(),
        })?;

        let mut entity = EntityConfig::from_binding(self.key.clone(), binding, layout, self.polling)?;
        if let Some(name) = &self.name {
            entity.name = name.clone();
        }
        Ok(entity)
    }
}

use crate::storage::{self, StorageManager};
use serde::{Deserialize, Serialize};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default embedding model for the in-process similarity backend
const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
/// Default timeout for a single external index process invocation
const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 30;
/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Deployment profile for the similarity engine.
///
/// `Constrained` never spawns the external index process (the deployment
/// target is assumed not to have it); `Unconstrained` tries it first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Constrained,
    #[default]
    Unconstrained,
}

/// Configuration for the similarity engine and its backends
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Deployment profile, see [`RuntimeMode`]
    #[serde(default)]
    pub mode: RuntimeMode,

    /// Command line for the external vector index process, program first
    /// (e.g. `["python3", "scripts/similarity_index.py"]`).
    /// Empty disables the external backend entirely.
    #[serde(default)]
    pub index_command: Vec<String>,

    /// Model name for embeddings (e.g. "all-MiniLM-L6-v2")
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Whether constrained mode still attempts to load the in-process
    /// embedding model before settling on keyword matching
    #[serde(default = "default_true")]
    pub embeddings_when_constrained: bool,

    /// Timeout for one external index process invocation, in seconds
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            mode: RuntimeMode::default(),
            index_command: vec![],
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embeddings_when_constrained: true,
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the description generation helper
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Command line for the external summarizer process, program first.
    /// Empty disables it and the keyword heuristic is used directly.
    #[serde(default)]
    pub command: Vec<String>,

    /// Timeout for one summarizer process invocation, in seconds
    #[serde(default = "default_process_timeout_secs")]
    pub process_timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            command: vec![],
            process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
        }
    }
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_process_timeout_secs() -> u64 {
    DEFAULT_PROCESS_TIMEOUT_SECS
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_listen() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            similarity: SimilarityConfig::default(),
            summary: SummaryConfig::default(),
            base_path: String::new(),
        }
    }
}

impl Config {
    fn validate(&self) {
        let sim = &self.similarity;
        if sim.model.trim().is_empty() {
            panic!("similarity.model must not be empty");
        }

        if sim.process_timeout_secs == 0 {
            panic!("similarity.process_timeout_secs must be greater than 0");
        }

        if sim.download_timeout_secs == 0 {
            panic!("similarity.download_timeout_secs must be greater than 0");
        }

        if self.summary.process_timeout_secs == 0 {
            panic!("summary.process_timeout_secs must be greater than 0");
        }

        if self.listen.trim().is_empty() {
            panic!("listen address must not be empty");
        }
    }

    pub fn load() -> Self {
        Self::load_with(".")
    }

    pub fn load_with(base_path: &str) -> Self {
        let store = storage::BackendLocal::new(base_path).expect("couldnt open config directory");

        // create new if does not exist
        if !store.exists("config.yaml") {
            store
                .write(
                    "config.yaml",
                    serde_yml::to_string(&Self::default()).unwrap().as_bytes(),
                )
                .expect("couldnt write default config");
        }

        let config_str = String::from_utf8(store.read("config.yaml").expect("couldnt read config"))
            .expect("config file is not valid utf8");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let store =
            storage::BackendLocal::new(&self.base_path).expect("couldnt open config directory");

        let config_str = serde_yml::to_string(&self).unwrap();
        store
            .write("config.yaml", config_str.as_bytes())
            .expect("couldnt write config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate();

        assert_eq!(config.similarity.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.similarity.mode, RuntimeMode::Unconstrained);
        assert!(config.similarity.embeddings_when_constrained);
        assert!(config.similarity.index_command.is_empty());
    }

    #[test]
    fn test_runtime_mode_parses_lowercase() {
        let config: SimilarityConfig = serde_yml::from_str("mode: constrained").unwrap();
        assert_eq!(config.mode, RuntimeMode::Constrained);
        assert_eq!(
            config.process_timeout_secs,
            DEFAULT_PROCESS_TIMEOUT_SECS
        );
    }
}

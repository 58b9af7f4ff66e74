use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use seeker_types::Mode;

use crate::{Error, Result};

/// Environment variables the runtime recognizes.
pub const ENV_LLM_API_KEY: &str = "LLM_API_KEY";
pub const ENV_SEARCH_API_KEY: &str = "SEARCH_API_KEY";
pub const ENV_VAULT_PATH: &str = "VAULT_PATH";
pub const ENV_HISTORY_FILE: &str = "HISTORY_FILE";
pub const ENV_VERBOSE: &str = "VERBOSE";
pub const ENV_CLASSIFIER_MODEL: &str = "CLASSIFIER_MODEL";

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Fully resolved runtime configuration.
///
/// Resolution order: defaults ← config file ← environment ← CLI flags.
/// The orchestrator receives this struct at construction; nothing reads
/// the environment after startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub model: String,
    pub classifier_model: Option<String>,
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub search_api_key: String,
    pub mode: Mode,
    /// Bounded worker pool size.
    pub max_concurrency: usize,
    /// Per-node retry cap.
    pub max_retries: u32,
    pub gap_fill_limit: usize,
    pub gap_importance_threshold: f64,
    pub context_budget: usize,
    pub fold_trigger_ratio: f64,
    pub state_dir: PathBuf,
    pub vault_path: Option<PathBuf>,
    pub history_file: Option<PathBuf>,
    pub verbose: bool,
    pub session_timeout: Duration,
    pub worker_timeout: Duration,
    pub scheduler_backoff: Duration,
    pub host_blacklist: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            classifier_model: None,
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_api_key: String::new(),
            search_api_key: String::new(),
            mode: Mode::Deep,
            max_concurrency: 5,
            max_retries: 2,
            gap_fill_limit: 3,
            gap_importance_threshold: 0.5,
            context_budget: 40_000,
            fold_trigger_ratio: 0.75,
            state_dir: default_state_dir(),
            vault_path: None,
            history_file: None,
            verbose: false,
            session_timeout: Duration::from_secs(2 * 60 * 60),
            worker_timeout: Duration::from_secs(30 * 60),
            scheduler_backoff: Duration::from_millis(100),
            host_blacklist: Vec::new(),
        }
    }
}

/// State directory priority: XDG data dir, then `~/.seeker`, then the
/// working directory as a last resort.
fn default_state_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("seeker");
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home).join(".seeker");
    }
    PathBuf::from(".seeker")
}

/// Optional overrides persisted as `{state_dir}/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub classifier_model: Option<String>,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub gap_fill_limit: Option<usize>,
    #[serde(default)]
    pub context_budget: Option<usize>,
    #[serde(default)]
    pub host_blacklist: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::Config(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| Error::Config(e.to_string()))
    }
}

impl RuntimeConfig {
    /// Resolve configuration from defaults, the config file and the
    /// environment. Missing required keys are a configuration error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_file_overrides()?;
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file_overrides(&mut self) -> Result<()> {
        let file = FileConfig::load_from(&self.state_dir.join("config.toml"))?;
        if let Some(model) = file.model {
            self.model = model;
        }
        if let Some(model) = file.classifier_model {
            self.classifier_model = Some(model);
        }
        if let Some(url) = file.llm_base_url {
            self.llm_base_url = url;
        }
        if let Some(n) = file.max_concurrency {
            self.max_concurrency = n.max(1);
        }
        if let Some(n) = file.gap_fill_limit {
            self.gap_fill_limit = n;
        }
        if let Some(n) = file.context_budget {
            self.context_budget = n;
        }
        if let Some(hosts) = file.host_blacklist {
            self.host_blacklist = hosts;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        self.llm_api_key = std::env::var(ENV_LLM_API_KEY)
            .map_err(|_| Error::Config(format!("{ENV_LLM_API_KEY} is required")))?;
        self.search_api_key = std::env::var(ENV_SEARCH_API_KEY)
            .map_err(|_| Error::Config(format!("{ENV_SEARCH_API_KEY} is required")))?;

        if let Ok(path) = std::env::var(ENV_VAULT_PATH) {
            self.vault_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(ENV_HISTORY_FILE) {
            self.history_file = Some(PathBuf::from(path));
        }
        if let Ok(value) = std::env::var(ENV_VERBOSE) {
            self.verbose = value == "1";
        }
        if let Ok(model) = std::env::var(ENV_CLASSIFIER_MODEL) {
            self.classifier_model = Some(model);
        }
        Ok(())
    }
}

//! Configuration types.
//!
//! Every knob the pipeline reads is carried in an explicit value passed to the
//! component that needs it. `from_env()` constructors read the process
//! environment once at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Categories an item may be filed under.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Top Insights & Breakthroughs",
    "New Frameworks & Tools",
    "Agentic Workflow Spotlights",
    "Ethical & Societal Impact",
    "Research & Academic Highlights",
    "Tutorials & Learning Resources",
    "Industry News & Applications",
    "Miscellaneous",
];

/// Category substituted for anything outside the allowlist.
pub const DEFAULT_CATEGORY: &str = "Miscellaneous";

/// Aggregate configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub quality: QualityConfig,
    pub validator: ValidatorConfig,
    pub delivery: DeliveryConfig,
    pub schedule: ScheduleConfig,
}

impl DigestConfig {
    /// Build the whole configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            llm: llm_config_from_env()?,
            research: ResearchConfig::from_env(),
            quality: QualityConfig::from_env(),
            validator: ValidatorConfig::default(),
            delivery: DeliveryConfig::from_env(),
            schedule: ScheduleConfig::from_env()?,
        })
    }
}

/// What to fetch and how much of it to feed the model.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// Search keywords, one web/arXiv query per keyword.
    pub keywords: Vec<String>,
    /// RSS/Atom feed URLs.
    pub feeds: Vec<String>,
    /// Whether to query arXiv.
    pub arxiv: bool,
    /// Serper.dev key; web search is skipped without one.
    pub serper_api_key: Option<SecretString>,
    /// Cap on source items per run.
    pub max_items: usize,
    /// Maximum summary length in characters.
    pub max_summary_len: usize,
    /// Maximum article content passed to the model, in characters.
    pub max_chunk: usize,
    /// Concurrent scoring calls in the curate stage.
    pub scoring_concurrency: usize,
    /// Timeout for a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            keywords: split_list(
                "AI agent development, multi-agent systems, autonomous agents, \
                 langchain, langgraph, crewai, agentic workflows, LLM agents",
            ),
            feeds: split_list("https://news.ycombinator.com/rss,https://techcrunch.com/feed/"),
            arxiv: true,
            serper_api_key: None,
            max_items: 20,
            max_summary_len: 300,
            max_chunk: 4000,
            scoring_concurrency: 4,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl ResearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            keywords: std::env::var("DIGEST_KEYWORDS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.keywords),
            feeds: std::env::var("DIGEST_RSS_FEEDS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.feeds),
            arxiv: env_parse("DIGEST_ARXIV", defaults.arxiv),
            serper_api_key: std::env::var("SERPER_API_KEY")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            max_items: env_parse("DIGEST_MAX_ITEMS", defaults.max_items),
            max_summary_len: env_parse("DIGEST_MAX_SUMMARY_LEN", defaults.max_summary_len),
            max_chunk: env_parse("DIGEST_MAX_CHUNK", defaults.max_chunk),
            scoring_concurrency: env_parse(
                "DIGEST_SCORING_CONCURRENCY",
                defaults.scoring_concurrency,
            )
            .max(1),
            fetch_timeout: Duration::from_secs(env_parse(
                "DIGEST_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
        }
    }
}

/// Thresholds for the quality gate and the recovery parser.
#[derive(Debug, Clone)]
pub struct QualityConfig {
    /// Minimum review score to approve; also the curation relevance cut-off.
    pub min_score: f64,
    /// Ceiling on revision attempts.
    pub max_revisions: u32,
    /// Decode attempts allowed to the recovery parser.
    pub parse_attempts: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_score: 0.7,
            max_revisions: 2,
            parse_attempts: 3,
        }
    }
}

impl QualityConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_score: env_parse("DIGEST_MIN_QUALITY", defaults.min_score),
            max_revisions: env_parse("DIGEST_MAX_REVISIONS", defaults.max_revisions),
            parse_attempts: env_parse("DIGEST_PARSE_ATTEMPTS", defaults.parse_attempts).max(1),
        }
    }
}

/// Allowlists and placeholders used by the schema validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub categories: Vec<String>,
    pub default_category: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

/// Mail and archive settings.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub recipients: Vec<String>,
    pub sender: String,
    pub subject_prefix: String,
    pub smtp: Option<SmtpConfig>,
    pub archive_dir: PathBuf,
    pub send_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            recipients: Vec::new(),
            sender: "digest@example.com".to_string(),
            subject_prefix: "AI Agent Weekly Digest: ".to_string(),
            smtp: None,
            archive_dir: PathBuf::from("./data/archives"),
            send_timeout: Duration::from_secs(60),
        }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            recipients: std::env::var("DIGEST_RECIPIENTS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            sender: std::env::var("DIGEST_SENDER").unwrap_or(defaults.sender),
            subject_prefix: std::env::var("DIGEST_SUBJECT_PREFIX")
                .unwrap_or(defaults.subject_prefix),
            smtp: SmtpConfig::from_env(),
            archive_dir: std::env::var("DIGEST_ARCHIVE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.archive_dir),
            send_timeout: Duration::from_secs(env_parse(
                "DIGEST_SEND_TIMEOUT_SECS",
                defaults.send_timeout.as_secs(),
            )),
        }
    }
}

/// SMTP relay credentials.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl SmtpConfig {
    /// Returns `None` if `SMTP_HOST` is not set (mail disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok().filter(|h| !h.is_empty())?;
        Some(Self {
            host,
            port: env_parse("SMTP_PORT", 587),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default()),
        })
    }
}

/// When the `schedule` command fires.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        // Fridays at 10:00 UTC.
        Self {
            cron: "0 0 10 * * Fri *".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let cron = std::env::var("DIGEST_SCHEDULE").unwrap_or_else(|_| Self::default().cron);
        let config = Self { cron };
        config.parse()?;
        Ok(config)
    }

    /// Parse the cron expression.
    pub fn parse(&self) -> Result<cron::Schedule, ConfigError> {
        cron::Schedule::from_str(&self.cron).map_err(|e| ConfigError::InvalidSchedule {
            schedule: self.cron.clone(),
            reason: e.to_string(),
        })
    }
}

fn llm_config_from_env() -> Result<LlmConfig, ConfigError> {
    let backend = match std::env::var("DIGEST_LLM_BACKEND")
        .unwrap_or_else(|_| "ollama".to_string())
        .to_lowercase()
        .as_str()
    {
        "anthropic" => LlmBackend::Anthropic,
        "openai" => LlmBackend::OpenAi,
        "ollama" => LlmBackend::Ollama,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "DIGEST_LLM_BACKEND".into(),
                message: format!("unknown backend '{other}' (expected anthropic, openai or ollama)"),
            });
        }
    };

    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => (Some("ANTHROPIC_API_KEY"), "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => (Some("OPENAI_API_KEY"), "gpt-4o"),
        LlmBackend::Ollama => (None, "llama3"),
    };

    let api_key = match key_var {
        Some(var) => std::env::var(var)
            .map_err(|_| ConfigError::MissingEnvVar(var.to_string()))?,
        None => String::new(),
    };

    Ok(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model: std::env::var("DIGEST_LLM_MODEL").unwrap_or_else(|_| default_model.to_string()),
        base_url: std::env::var("OLLAMA_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        timeout: Duration::from_secs(env_parse("DIGEST_LLM_TIMEOUT_SECS", 60)),
    })
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" a, b ,, c ,"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn default_categories_contain_default() {
        let config = ValidatorConfig::default();
        assert!(config.categories.contains(&config.default_category));
    }

    #[test]
    fn default_schedule_parses() {
        let schedule = ScheduleConfig::default().parse().unwrap();
        assert!(schedule.upcoming(chrono::Utc).next().is_some());
    }

    #[test]
    fn invalid_schedule_is_config_error() {
        let config = ScheduleConfig {
            cron: "not a cron".into(),
        };
        assert!(matches!(
            config.parse(),
            Err(ConfigError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn quality_defaults_match_editorial_policy() {
        let q = QualityConfig::default();
        assert_eq!(q.min_score, 0.7);
        assert_eq!(q.max_revisions, 2);
        assert_eq!(q.parse_attempts, 3);
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub slots_csv: Option<String>,
    pub llm_provider: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub responder: String,
    pub collaborator_timeout: Duration,
    pub pending_ttl_minutes: i64,
    pub history_window: usize,
    pub max_supervisor_steps: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "clinicbook.db".to_string()),
            slots_csv: env::var("SLOTS_CSV").ok().filter(|v| !v.is_empty()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            responder: env::var("RESPONDER").unwrap_or_else(|_| "llm".to_string()),
            collaborator_timeout: Duration::from_secs(env_or("COLLABORATOR_TIMEOUT_SECS", 30)),
            pending_ttl_minutes: env_or("PENDING_TTL_MINUTES", 30),
            history_window: env_or("HISTORY_WINDOW", 4),
            max_supervisor_steps: env_or("MAX_SUPERVISOR_STEPS", 8),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: ":memory:".to_string(),
            slots_csv: None,
            llm_provider: "ollama".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            responder: "llm".to_string(),
            collaborator_timeout: Duration::from_secs(30),
            pending_ttl_minutes: 30,
            history_window: 4,
            max_supervisor_steps: 8,
        }
    }
}

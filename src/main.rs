use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use clinicbook::config::AppConfig;
use clinicbook::db;
use clinicbook::handlers;
use clinicbook::services::ai::groq::GroqProvider;
use clinicbook::services::ai::intent::LlmIntentExtractor;
use clinicbook::services::ai::ollama::OllamaProvider;
use clinicbook::services::ai::responder::{LlmToolResponder, RuleBasedResponder, ToolResponder};
use clinicbook::services::ai::LlmProvider;
use clinicbook::services::seed;
use clinicbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if let Some(csv_path) = &config.slots_csv {
        seed::import_csv(&conn, Path::new(csv_path))?;
    }

    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Arc::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        _ => {
            tracing::info!("using Ollama LLM provider (url: {}, model: {})", config.ollama_url, config.ollama_model);
            Arc::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
    };

    let responder: Box<dyn ToolResponder> = match config.responder.as_str() {
        "rules" => {
            tracing::info!("using rule-based booking responder");
            Box::new(RuleBasedResponder)
        }
        _ => Box::new(LlmToolResponder::new(Arc::clone(&llm))),
    };

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        extractor: Box::new(LlmIntentExtractor::new(llm)),
        responder,
    });

    let app = handlers::build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

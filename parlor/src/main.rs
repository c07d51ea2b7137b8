//! Parlor - conversation practice gateway

use clap::Parser;
use parlor_agent::{LlmBackend, OpenAiBackend};
use std::sync::Arc;
use tracing::{error, info, warn};

use parlor::{
    config::{Args, StoreBackend},
    db::{ConversationStore, MemoryStore, MongoStore, UserStore},
    logging, server, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Parlor - conversation practice");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Store: {:?}", args.store_backend);
    info!("LLM: {} @ {}", args.llm_model, args.llm_base_url);
    info!("======================================");

    let (users, conversations) = open_store(&args).await;

    let backend: Arc<dyn LlmBackend> = Arc::new(OpenAiBackend::new(
        args.llm_base_url.clone(),
        args.llm_model.clone(),
        args.llm_api_key.clone(),
    )?);
    if args.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set; provider calls will be unauthenticated");
    }

    let state = AppState::new(args, users, conversations, backend)?;
    server::run(Arc::new(state)).await?;

    Ok(())
}

/// Connect the configured store. MongoDB failures are fatal outside dev mode.
async fn open_store(args: &Args) -> (Arc<dyn UserStore>, Arc<dyn ConversationStore>) {
    if args.store_backend == StoreBackend::Memory {
        info!("Using in-memory store (data is lost on restart)");
        return memory_store();
    }

    info!("MongoDB: {}", args.mongodb_uri);
    match MongoStore::connect(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(store) => {
            info!("MongoDB connected successfully");
            let store = Arc::new(store);
            (store.clone() as Arc<dyn UserStore>, store as Arc<dyn ConversationStore>)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                memory_store()
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn memory_store() -> (Arc<dyn UserStore>, Arc<dyn ConversationStore>) {
    let store = Arc::new(MemoryStore::new());
    (store.clone(), store)
}

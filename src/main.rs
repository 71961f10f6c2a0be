use dotenvy::dotenv;
use std::{env, sync::Arc};
use ticket_ledger::{
    cli::{self, Command},
    config::{self, database},
    errors::Result,
    jobs,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Parse arguments before touching the store
    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args).inspect_err(|e| error!("{}", e))?;

    // 4. Load settings and open the ledger store
    let settings = config::load_default_settings()
        .inspect_err(|e| error!("Failed to load settings: {}", e))?;
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to initialize database: {}", e))?;

    // 5. One action, or daemon mode
    match command {
        Command::Once(action) => {
            let output = cli::execute(&db, &settings, action).await?;
            println!("{output}");
        }
        Command::Daemon => {
            let handles = jobs::spawn_all(db, Arc::new(settings.tiers), &settings.schedule);
            info!(jobs = handles.len(), "Scheduler running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
            for handle in handles {
                handle.abort();
            }
        }
    }

    Ok(())
}

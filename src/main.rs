use anyhow::Result;
use reframe::config::Config;
use reframe::gemini;
use reframe::io::NativeStorage;
use reframe::workflow::RejuvenationWorkflow;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            eprintln!("Please ensure 'config.yml' exists with valid Gemini settings.");
            return Err(e);
        }
    };

    config.ensure_directories()?;

    let client = gemini::create_client(&config.gemini);
    let storage = Arc::new(NativeStorage::new());

    let mut workflow = RejuvenationWorkflow::new(config, client, storage).await?;
    workflow.run().await?;

    Ok(())
}

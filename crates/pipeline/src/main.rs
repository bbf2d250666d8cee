use anyhow::Result;
use pipeline::{AppConfig, default_registry, logging, run};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    logging::init(&config.logging)?;
    info!(
        input = %config.input.dir.display(),
        output = %config.output.dir.display(),
        strategy = %config.chunks.strategy,
        model = %config.llm.model,
        "Starting graphrag run"
    );

    let registry = default_registry(&config)?;
    let stats = run(&config, &registry).await?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

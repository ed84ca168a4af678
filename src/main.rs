use anyhow::{Context, Result};
use hkweather_core::Config;
use hkweather_data::{DatasetName, RefreshCache};

#[tokio::main]
async fn main() -> Result<()> {
    hkweather_core::init()?;

    let (config, _) = Config::load_validated()?;
    let cache = RefreshCache::from_config(&config).context("Failed to build HKO client")?;

    tracing::info!(
        upstream = %config.upstream.base_url,
        max_age = ?cache.default_max_age(),
        "hkweather started"
    );

    let mut tasks = Vec::new();
    for dataset in DatasetName::ALL {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move { cache.get_default(dataset).await }));
    }

    for task in tasks {
        let record = task.await.context("Dataset task failed")?;
        println!(
            "{} [{:?} -> HTTP {}]",
            record.dataset,
            record.status(),
            record.status().http_status()
        );
        println!("{}", serde_json::to_string_pretty(&record)?);
    }

    let health = cache.health().await;
    println!("{}", serde_json::to_string_pretty(&health)?);
    println!("{}", serde_json::to_string_pretty(&cache.status())?);

    Ok(())
}

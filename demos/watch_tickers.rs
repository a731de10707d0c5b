use coinwatch_sdk::preferences::ordered_view;
use coinwatch_sdk::{FileStorage, PollingController, PreferencesStore, SyncConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();

    let config = SyncConfig::from_env();
    println!("CoinWatch ticker sync ({:?})", config.environment);
    println!("Cache dir: {}", config.cache_dir.display());
    println!("==================================");

    let prefs = PreferencesStore::load(Arc::new(FileStorage::new(&config.cache_dir)));
    let controller = PollingController::from_config(&config)?;
    let mut subscription = controller.start(config.refresh_interval);

    // Watch loop
    for _ in 0..10 {
        let Some(state) = subscription.changed().await else {
            break;
        };

        println!("\n{:-<50}", "");
        if let Some(error) = &state.error {
            println!("{}", error);
            continue;
        }
        if state.loading {
            println!("Loading...");
        }

        let favorites = prefs.get().favorites;
        for coin in ordered_view(&state.data, &favorites) {
            println!(
                "{:<12} {:>14} {:>8}%",
                coin.display_pair(),
                coin.ticker.last,
                coin.ticker.percent_change
            );
        }
    }

    let metrics = controller.metrics().await;
    println!(
        "\nRefreshes: {} (success rate {:.1}%), direct hits: {}, relay hits: {}",
        metrics.total_refreshes,
        metrics.success_rate * 100.0,
        metrics.routes.direct_hits,
        metrics.routes.proxy_hits
    );

    subscription.stop();
    Ok(())
}

#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use tracing_subscriber::EnvFilter;
    use weekplan::{HolidayService, Planner, PlannerConfig, http_api, persistence};

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PlannerConfig::load()?;
    let addr: SocketAddr = config.http_addr.parse()?;

    let store: Arc<dyn persistence::PlannerStore> = Arc::from(persistence::open_store(&config)?);
    let doc = persistence::load_document(store.as_ref());
    let holidays = HolidayService::for_config(
        &config,
        persistence::load_school_cache(store.as_ref()),
        persistence::load_legal_cache(store.as_ref()),
    );
    let planner = Planner::new(doc, chrono::Local::now().date_naive());
    let state = http_api::AppState::new(planner, holidays).with_store(store);

    println!(
        "weekplan HTTP API listening on http://{addr} (data in {})",
        config.data_dir.display()
    );
    http_api::serve(addr, state).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}

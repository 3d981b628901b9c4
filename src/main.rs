#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)      // Default to Info for everything
        .filter_module("sqlx", LevelFilter::Warn)  // Suppress sqlx Debug logs
        .parse_default_env()
        .init();

    println!("Metadata registry: study and entity service");

    metadata_registry::run_server().await
}

use anyhow::Result;
use metadata_registry::config::AppConfig;
use metadata_registry::logic::directory::load_property_map;
use metadata_registry::logic::lookup::rebuild_entity_index;
use metadata_registry::store::PostgresStore;

/// Recompute the entity index rows of every stored study.
///
/// Needed once for studies written before the index existed, or after the
/// index table was dropped.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    let database_url = config.database_url()?;
    let store = PostgresStore::new(&database_url, config.database.max_connections.unwrap_or(5)).await?;
    store.migrate().await?;

    println!("Connected to database. Rebuilding entity index...");

    let mapper = load_property_map(&store, true).await?;
    println!("Loaded {} properties", mapper.len());

    let indexed = rebuild_entity_index(&store, &mapper).await?;
    println!("Entity index rebuilt for {} studies", indexed);

    Ok(())
}

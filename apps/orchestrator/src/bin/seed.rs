// [apps/orchestrator/src/bin/seed.rs]
/*!
 * =================================================================
 * APARATO: CATALOG SEED TOOL (V4.0 - DEV ONLY)
 * CLASIFICACIÓN: OPERATIONS TOOLING (ESTRATO L0-OPS)
 * RESPONSABILIDAD: POBLACIÓN DEL ESPEJO DE CATÁLOGO EN DESARROLLO
 *
 * El catálogo de producción es gobernado externamente; esta herramienta
 * existe para entornos locales y cámaras de certificación.
 * =================================================================
 */

use dotenvy::dotenv;
use fingerswarm_infra_db::repositories::CatalogRepository;
use fingerswarm_infra_db::{GatekeeperClient, GatekeeperPolicy};
use fingerswarm_shared_heimdall::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing("fingerswarm_seed");

    let database_connection_url = std::env::var("DATABASE_URL")
        .expect("CRITICAL_FAULT: DATABASE_URL not defined in runtime environment.");
    let database_access_token = std::env::var("TURSO_AUTH_TOKEN").ok();

    // Rango de streams sintéticos: SEED_STREAM_COUNT ids desde 1.
    let seed_stream_count: i64 = std::env::var("SEED_STREAM_COUNT")
        .ok()
        .and_then(|raw_value| raw_value.parse().ok())
        .unwrap_or(25);

    let gatekeeper = GatekeeperClient::connect(
        &database_connection_url,
        database_access_token,
        GatekeeperPolicy::default(),
    )
    .await?;

    let catalog_repository = CatalogRepository::new(gatekeeper);
    let seeded = catalog_repository
        .seed_streams((1..=seed_stream_count).collect())
        .await?;

    info!("🌱 [SEED]: Catalog mirror populated with {} streams.", seeded);
    Ok(())
}

// [apps/orchestrator/src/services/catalog_sync.rs]
//! =================================================================
//! APARATO: CATALOG SYNC SERVICE (V6.0 - READ ONLY MIRROR)
//! CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
//! RESPONSABILIDAD: REFRESCO PERIÓDICO DEL ESPEJO DE CATÁLOGO
//!
//! El catálogo es gobernado externamente; este daemon solo lee. Ante un
//! fallo transitorio, el ciclo se omite y el snapshot previo sobrevive.
//! =================================================================

use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::state::AppState;

pub async fn spawn_catalog_sync(application_state: AppState) {
    let mut refresh_ticker =
        interval(Duration::from_secs(application_state.config.catalog_refresh_s));
    refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::spawn(async move {
        info!("📻 [CATALOG_SYNC]: External catalog mirror daemon initiated.");

        loop {
            refresh_ticker.tick().await;

            match application_state.catalog_repository.list_active_streams().await {
                Ok(active_streams) => {
                    let previous_population = application_state.catalog_view().len();
                    if previous_population != active_streams.len() {
                        info!(
                            "📻 [CATALOG_SYNC]: Catalog population shifted {} -> {}.",
                            previous_population,
                            active_streams.len()
                        );
                    } else {
                        debug!("📻 [CATALOG_SYNC]: Catalog stable at {} streams.", active_streams.len());
                    }
                    application_state.refresh_catalog_snapshot(active_streams);
                    application_state.readiness.catalog_sync.store(true, Ordering::Relaxed);
                }
                Err(refresh_fault) => {
                    // El snapshot previo sigue vigente; el ciclo se omite.
                    error!("❌ [CATALOG_SYNC]: Mirror refresh skipped: {}", refresh_fault);
                }
            }
        }
    });
}

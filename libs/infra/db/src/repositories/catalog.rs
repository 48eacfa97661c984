// [libs/infra/db/src/repositories/catalog.rs]
//! =================================================================
//! APARATO: STREAM CATALOG MIRROR (V5.0 - READ ONLY)
//! CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
//! RESPONSABILIDAD: LECTURA DEL ESPEJO DEL CATÁLOGO EXTERNO
//!
//! El catálogo es gobernado externamente. El plano de control lo lee y
//! lo cachea; solo el seed de desarrollo escribe esta tabla.
//! =================================================================

use libsql::params;
use tracing::instrument;

use crate::client::GatekeeperClient;
use crate::errors::DbError;

/// Lector del espejo local del catálogo de streams.
pub struct CatalogRepository {
    gatekeeper: GatekeeperClient,
}

impl CatalogRepository {
    #[must_use]
    pub fn new(gatekeeper: GatekeeperClient) -> Self {
        Self { gatekeeper }
    }

    /// Conjunto activo de streams a cubrir, en orden ascendente.
    pub async fn list_active_streams(&self) -> Result<Vec<i64>, DbError> {
        self.gatekeeper
            .run_read("catalog_list_active", move |connection| {
                Box::pin(async move {
                    let mut rows = connection
                        .query(
                            "SELECT stream_id FROM stream_catalog WHERE is_active = 1 ORDER BY stream_id ASC",
                            (),
                        )
                        .await?;

                    let mut active_streams = Vec::new();
                    while let Some(row) = rows.next().await? {
                        active_streams.push(row.get::<i64>(0)?);
                    }
                    Ok(active_streams)
                })
            })
            .await
    }

    /// Población del espejo para entornos de desarrollo y certificación.
    /// El orquestador en producción jamás invoca esta operación.
    #[instrument(skip(self, stream_ids), fields(count = stream_ids.len()))]
    pub async fn seed_streams(&self, stream_ids: Vec<i64>) -> Result<u32, DbError> {
        self.gatekeeper
            .run_write("catalog_seed_streams", move |connection| {
                let stream_ids = stream_ids.clone();
                Box::pin(async move {
                    let mut seeded_count = 0u32;
                    for stream_id in &stream_ids {
                        seeded_count += connection
                            .execute(
                                r#"
                                INSERT INTO stream_catalog (stream_id, is_active)
                                VALUES (?1, 1)
                                ON CONFLICT(stream_id) DO UPDATE SET is_active = 1
                                "#,
                                params![*stream_id],
                            )
                            .await? as u32;
                    }
                    Ok(seeded_count)
                })
            })
            .await
    }
}

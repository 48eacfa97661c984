// [apps/orchestrator/src/kernel.rs]
/**
 * =================================================================
 * APARATO: ORCHESTRATOR SOVEREIGN KERNEL (V22.0 - DAEMON ROSTER)
 * CLASIFICACIÓN: COMPOSITION ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * VISION HIPER-HOLÍSTICA:
 * Actúa como la placa base donde se conectan todos los servicios:
 * Gatekeeper -> AppState -> daemons (catálogo, sentinel, auditor,
 * conductor, reaper) -> servidor Axum. La ignición del esquema ocurre
 * antes de abrir el socket TCP.
 * =================================================================
 */

use std::net::SocketAddr;

use tracing::{error, info, instrument};

use fingerswarm_infra_db::GatekeeperClient;

use crate::config::OrchestratorConfig;
use crate::routes::create_sovereign_router;
use crate::services::{
    catalog_sync::spawn_catalog_sync, spawn_reaper, ConsistencyAuditorService,
    HeartbeatSentinelService, RebalanceConductorService,
};
use crate::state::AppState;

pub struct OrchestratorKernel {
    pub server_network_port: u16,
    pub application_shared_state: AppState,
}

impl OrchestratorKernel {
    /**
     * Realiza la ignición del Gatekeeper y el estado neural.
     * Establece (y certifica) el enlace al Motor A antes de levantar servicios.
     */
    #[instrument(skip(configuration))]
    pub async fn ignite(configuration: OrchestratorConfig) -> Self {
        let gatekeeper = GatekeeperClient::connect(
            &configuration.database_connection_url,
            configuration.database_access_token.clone(),
            configuration.gatekeeper_policy(),
        )
        .await
        .expect("FATAL: Database link collapse. Ignition aborted.");

        let listening_port = configuration.listening_port;

        Self {
            server_network_port: listening_port,
            application_shared_state: AppState::new(gatekeeper, configuration),
        }
    }

    /**
     * Lanza todas las operaciones autónomas del plano de control:
     * daemons de mantenimiento y el servidor HTTP principal.
     */
    pub async fn launch_sovereign_operations(self) {
        let shared_application_state = self.application_shared_state.clone();

        // --- 1. DIAGNÓSTICO DE ARRANQUE (Ledger + contrato efectivo) ---
        Self::report_startup_diagnostics(&shared_application_state).await;

        // --- 2. ESPEJO DE CATÁLOGO (primer refresco inmediato) ---
        spawn_catalog_sync(shared_application_state.clone()).await;

        // --- 3. DESPLIEGUE DE DAEMONS DE MANTENIMIENTO TÁCTICO ---

        // A. Sentinel de Latidos (máquina de estados + detección de fallos)
        let state_ref = shared_application_state.clone();
        tokio::spawn(async move {
            let sentinel = HeartbeatSentinelService::new(state_ref);
            sentinel.spawn_sentinel_daemon().await;
        });

        // B. Auditor de Consistencia (taxonomía de defectos)
        let state_ref = shared_application_state.clone();
        tokio::spawn(async move {
            let auditor = ConsistencyAuditorService::new(state_ref);
            auditor.spawn_auditor_daemon().await;
        });

        // C. Conductor de Rebalanceo (señales + tick de deriva)
        let state_ref = shared_application_state.clone();
        tokio::spawn(async move {
            let conductor = RebalanceConductorService::new(state_ref);
            conductor.spawn_conductor_daemon().await;
        });

        // D. Reaper (transacciones rezagadas + bóveda idempotente)
        spawn_reaper(shared_application_state.clone()).await;

        // --- 4. IGNICIÓN DEL SERVIDOR AXUM ---
        let router = create_sovereign_router(shared_application_state);
        let socket_address = SocketAddr::from(([0, 0, 0, 0], self.server_network_port));

        info!("🚀 [KERNEL]: Control plane listening on {}.", socket_address);

        match tokio::net::TcpListener::bind(socket_address).await {
            Ok(listener) => {
                if let Err(server_fault) = axum::serve(listener, router).await {
                    error!("❌ [KERNEL]: HTTP server collapsed: {}", server_fault);
                }
            }
            Err(bind_fault) => {
                error!("❌ [KERNEL]: Socket bind refused: {}", bind_fault);
                std::process::exit(1);
            }
        }
    }

    /// Radiografía de arranque: población del Ledger y salud del Gatekeeper.
    async fn report_startup_diagnostics(application_state: &AppState) {
        let fleet_population = application_state
            .instance_repository
            .list_all()
            .await
            .map(|fleet| fleet.len())
            .unwrap_or(0);
        let live_ownership = application_state
            .assignment_repository
            .list_live()
            .await
            .map(|ledger| ledger.len())
            .unwrap_or(0);
        let catalog_population = application_state
            .catalog_repository
            .list_active_streams()
            .await
            .map(|catalog| catalog.len())
            .unwrap_or(0);

        let gatekeeper_health = application_state.gatekeeper.health();

        info!(
            "🧾 [KERNEL]: Ledger radiography: instances={} live_assignments={} catalog={} pool={}/{}.",
            fleet_population,
            live_ownership,
            catalog_population,
            gatekeeper_health.pool_available,
            gatekeeper_health.pool_capacity
        );
    }
}

// [apps/orchestrator/src/main.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR MAIN ENTRY POINT (V13.0 - GOLD MASTER)
 * CLASIFICACIÓN: APPLICATION SHELL (ESTRATO L3)
 * RESPONSABILIDAD: BOOTSTRAP DE INFRAESTRUCTURA E IGNICIÓN SEGURA
 *
 * # Mathematical Proof (Deterministic Ignition):
 * El proceso garantiza que el esquema del Ledger cristalice antes de la
 * apertura del socket TCP, previniendo estados de carrera donde un
 * worker registre contra tablas aún no solidificadas.
 * =================================================================
 */

use dotenvy::dotenv;
use fingerswarm_orchestrator::prelude::*;
use fingerswarm_shared_heimdall::init_tracing;
use tracing::info;

/**
 * Punto de ignición supremo del binario del Orquestador.
 */
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. CARGA DE ENTORNO SOBERANO
    dotenv().ok();

    // 2. INICIALIZACIÓN DE OBSERVABILIDAD NEURAL (HEIMDALL)
    init_tracing("fingerswarm_orchestrator");

    // 3. RUNTIME SOBERANO
    let runtime_orchestrator = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime_orchestrator.block_on(async {
        info!("🛰️  [COMMAND_CENTER]: Global ignition sequence starting...");

        // 4. CAPTURA ÚNICA DEL CONTRATO DE CONFIGURACIÓN
        let configuration = OrchestratorConfig::from_environment();
        let listening_port = configuration.listening_port;

        // 5. CONSTRUCCIÓN DEL KERNEL SOBERANO (ESTRATO L1-APP)
        let kernel_instance = OrchestratorKernel::ignite(configuration).await;

        // 6. IGNICIÓN DE OPERACIONES DEL PLANO DE CONTROL
        info!("🚀 [FINGERSWARM_ONLINE]: Control plane operational on port {}.", listening_port);
        kernel_instance.launch_sovereign_operations().await;

        Ok(())
    })
}

// [apps/orchestrator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN ROUTING MATRIX (V16.0 - CONTROL PLANE TOPOLOGY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3)
 * RESPONSABILIDAD: TOPOLOGÍA DE ESTRATOS TÁCTICOS Y DE MANDO
 *
 * VISION HIPER-HOLÍSTICA:
 * La topología expone:
 * 1. REST Táctico del enjambre (registro, latidos, propiedad).
 * 2. Mando del operador (diagnóstico, rebalanceo, recuperación).
 * 3. Salud y preparación sin autenticación (sondas de plataforma).
 * =================================================================
 */

use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
    http::{header, Method},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{
    admin::OperatorCommandHandler, diagnostics::HealthSurfaceHandler, swarm::FleetHandshakeHandler,
};
use crate::middleware::{auth_guard, health_guard, idempotency_guard, operator_guard};
use crate::state::AppState;

pub fn create_sovereign_router(application_shared_state: AppState) -> Router {
    // Escudo de Red: CORS para el Dashboard de operadores.
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // Presupuesto global de petición: jamás un handler sin límite.
    let request_budget_shield = TimeoutLayer::new(Duration::from_secs(
        application_shared_state.config.request_timeout_s,
    ));

    // ESTRATO TÁCTICO: Protocolo del Enjambre (Workers)
    let swarm_operations_stratum = Router::new()
        // Alta idempotente (génesis o re-enganche)
        .route("/register", post(FleetHandshakeHandler::handle_register))
        // Latidos de Vida (biometría + órdenes advisorias)
        .route("/heartbeat", post(FleetHandshakeHandler::handle_heartbeat))
        // Earmarking bajo demanda
        .route("/assignment/request", post(FleetHandshakeHandler::handle_assignment_request))
        // Devolución voluntaria de propiedad
        .route("/release", post(FleetHandshakeHandler::handle_release))
        // Reporte por stream (score + observabilidad)
        .route("/update_stream", post(FleetHandshakeHandler::handle_update_stream));

    // ESTRATO DE MANDO: Command Center del Operador
    let operator_command_stratum = Router::new()
        .route("/instances", get(OperatorCommandHandler::handle_list_instances))
        .route("/assignments", get(OperatorCommandHandler::handle_list_assignments))
        .route(
            "/diagnostics/inconsistencies",
            get(OperatorCommandHandler::handle_list_inconsistencies),
        )
        .route("/rebalance", post(OperatorCommandHandler::handle_manual_rebalance))
        .route("/force_recovery", post(OperatorCommandHandler::handle_force_recovery))
        .route("/rebalances", get(OperatorCommandHandler::handle_rebalance_history))
        .route("/maintenance/enter", post(OperatorCommandHandler::handle_maintenance_enter))
        .route("/maintenance/exit", post(OperatorCommandHandler::handle_maintenance_exit))
        // Solo ciudadanos Operator cruzan este estrato.
        .layer(middleware::from_fn(operator_guard));

    // COMPOSICIÓN GLOBAL (Root Topology)
    Router::new()
        // Sondas de plataforma: sin autenticación, sin guardia de salud.
        .route("/health", get(HealthSurfaceHandler::handle_health))
        .route("/ready", get(HealthSurfaceHandler::handle_ready))
        .nest(
            "/api/v1",
            Router::new()
                .nest("/swarm", swarm_operations_stratum)
                .nest("/admin", operator_command_stratum)
                // Bóveda de replay para mutaciones con Idempotency-Key.
                .layer(middleware::from_fn_with_state(
                    application_shared_state.clone(),
                    idempotency_guard,
                ))
                // Veto de mantenimiento sobre mutaciones.
                .layer(middleware::from_fn_with_state(
                    application_shared_state.clone(),
                    health_guard,
                ))
                // Portero del perímetro (Workers y Operadores).
                .layer(middleware::from_fn_with_state(
                    application_shared_state.clone(),
                    auth_guard,
                )),
        )
        .layer(request_budget_shield)
        .layer(network_security_shield)
        .with_state(application_shared_state)
}

// [apps/orchestrator/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: PERIMETER GUARD STACK (V11.0 - TRIPLE SHIELD)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: AUTENTICACIÓN, SALUD PERIMETRAL Y REPLAY IDEMPOTENTE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DUAL CITIZENSHIP: Token simétrico de Workers y token de Operadores;
 *    la identidad viaja como extensión de la petición.
 * 2. MAINTENANCE VETO: Bajo mantenimiento, las mutaciones reciben 503
 *    con Retry-After; los diagnósticos permanecen alcanzables.
 * 3. REPLAY VAULT: Un reintento con la misma Idempotency-Key dentro de
 *    la ventana devuelve el desenlace original, byte a byte.
 * =================================================================
 */

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, warn};

use crate::state::AppState;

/// Identidad soberana extraída del túnel de seguridad.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub is_worker_node: bool,
    pub is_operator: bool,
}

/**
 * Guardia de Salud: veta mutaciones mientras el sistema está en mantenimiento.
 */
pub async fn health_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    // Las rutas de mando de mantenimiento escapan al veto: el operador
    // siempre debe poder salir del modo.
    let is_maintenance_control = request.uri().path().ends_with("/maintenance/enter")
        || request.uri().path().ends_with("/maintenance/exit");

    if request.method() != Method::GET && !is_maintenance_control {
        if let Err(reason) = state.is_operational() {
            warn!("⛔ [ACCESS_DENIED]: Sector under maintenance: {}", reason);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, "60")],
                Json(json!({
                    "error": "STRATA_MAINTENANCE_ACTIVE",
                    "reason": reason,
                })),
            )
                .into_response();
        }
    }
    next.run(request).await
}

/**
 * Guardia de Autenticación: el portero del perímetro /api/v1.
 *
 * # Logic:
 * 1. Token coincide con 'WORKER_AUTH_TOKEN' -> ciudadano Node.
 * 2. Token coincide con 'OPERATOR_AUTH_TOKEN' -> ciudadano Operator.
 * 3. En otro caso -> 401 Unauthorized.
 *
 * Con ambos tokens vacíos (entorno de desarrollo) el perímetro queda
 * abierto y la identidad inyectada es de operador.
 */
pub async fn auth_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let worker_secret = state.config.worker_auth_token.clone();
    let operator_secret = state.config.operator_auth_token.clone();

    if worker_secret.is_empty() && operator_secret.is_empty() {
        request
            .extensions_mut()
            .insert(CallerIdentity { is_worker_node: true, is_operator: true });
        return Ok(next.run(request).await);
    }

    let bearer_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header_value| header_value.to_str().ok())
        .and_then(|header_value| header_value.strip_prefix("Bearer "));

    let Some(presented_token) = bearer_token else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    if !operator_secret.is_empty() && presented_token == operator_secret {
        debug!("👤 [AUTH]: Operator credentials recognized.");
        request
            .extensions_mut()
            .insert(CallerIdentity { is_worker_node: false, is_operator: true });
        return Ok(next.run(request).await);
    }

    if !worker_secret.is_empty() && presented_token == worker_secret {
        debug!("🤖 [AUTH]: Worker node recognized.");
        request
            .extensions_mut()
            .insert(CallerIdentity { is_worker_node: true, is_operator: false });
        return Ok(next.run(request).await);
    }

    warn!("❌ [AUTH_REJECTION]: Invalid token presented.");
    Err(StatusCode::UNAUTHORIZED)
}

/**
 * Guardia de Operador: exige ciudadanía de operador en rutas de mando.
 */
pub async fn operator_guard(request: Request, next: Next) -> Result<Response, StatusCode> {
    let authorized = request
        .extensions()
        .get::<CallerIdentity>()
        .map(|identity| identity.is_operator)
        .unwrap_or(false);

    if !authorized {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(request).await)
}

/**
 * Bóveda de Replay: mutaciones repetidas con la misma Idempotency-Key
 * dentro de la ventana devuelven el desenlace original.
 *
 * Los 5xx no se cristalizan: un fallo transitorio debe poder reintentarse
 * de verdad.
 */
pub async fn idempotency_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let Some(idempotency_key) = request
        .headers()
        .get("Idempotency-Key")
        .and_then(|header_value| header_value.to_str().ok())
        .map(|header_value| format!("{}::{}", request.uri().path(), header_value))
    else {
        return next.run(request).await;
    };

    if let Some(sealed_reply) = state.idempotency_lookup(&idempotency_key) {
        debug!("♻️  [IDEMPOTENCY]: Replaying sealed outcome for {}", idempotency_key);
        return sealed_response(sealed_reply.status_code, sealed_reply.body_bytes);
    }

    let response = next.run(request).await;
    let status_code = response.status();

    if status_code.is_server_error() {
        return response;
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, 1024 * 1024).await {
        Ok(body_bytes) => {
            state.idempotency_seal(idempotency_key, status_code.as_u16(), body_bytes.to_vec());
            Response::from_parts(parts, Body::from(body_bytes))
        }
        Err(fault) => {
            warn!("⚠️ [IDEMPOTENCY]: Body capture bypassed: {}", fault);
            sealed_response(status_code.as_u16(), Vec::new())
        }
    }
}

fn sealed_response(status_code: u16, body_bytes: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body_bytes));
    *response.status_mut() =
        StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

// [apps/orchestrator/src/state/mod.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN STATE ORCHESTRATOR (V19.0 - CONTROL PLANE HUB)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: ORQUESTACIÓN DE REPOSITORIOS, COLAS Y MODO OPERATIVO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. COMPOSITION ROOT: Centraliza el rastro de repositorios, colas de
 *    órdenes advisorias, snapshot de catálogo y journal de defectos.
 * 2. COALESCED TRIGGERS: Las señales de rebalanceo se funden en una sola
 *    evaluación pendiente; a lo sumo un plan corre a la vez.
 * 3. WRITE BEHIND NONE: El Motor A es la fuente de verdad; lo que vive
 *    en RAM (catálogo, colas, stats) es reconstruible o efímero.
 * 4. NOMINAL PURITY: Erradicación total de abreviaciones. Uso de 'Arc<T>'
 *    para inmutabilidad compartida.
 * =================================================================
 */

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use fingerswarm_domain_models::{DefectRecord, RebalanceReason, UpdateStreamPayload, WorkerCommand};
use fingerswarm_infra_db::repositories::{
    AssignmentRepository, CatalogRepository, InstanceRepository, RebalanceRepository,
};
use fingerswarm_infra_db::GatekeeperClient;
use tracing::{debug, info};

use crate::config::OrchestratorConfig;

/// Capacidad del journal de defectos retenido en RAM para diagnóstico.
const DEFECT_JOURNAL_CAPACITY: usize = 256;

/// Modos de salud del sistema para la interceptación de middleware perimetral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemMode {
    /// El sistema procesa ráfagas de red y asigna streams de forma nominal.
    Operational,
    /// El sistema ha suspendido las mutaciones por mantenimiento.
    Maintenance(String),
}

/// Contadores de procesamiento acumulados entre latidos de un nodo.
#[derive(Debug, Default)]
pub struct ProcessingLedger {
    pub processed_ok: u64,
    pub processed_failed: u64,
    /// Deduplicación de reintentos por (stream_id, timestamp).
    seen_updates: HashSet<(i64, i64)>,
}

/// Respuesta cristalizada para el replay idempotente.
#[derive(Debug, Clone)]
pub struct IdempotentReply {
    pub status_code: u16,
    pub body_bytes: Vec<u8>,
    pub sealed_at: Instant,
}

/// Marcadores de primer ciclo completado por daemon (gating de /ready).
#[derive(Debug, Default)]
pub struct ReadinessLedger {
    pub heartbeat_sentinel: AtomicBool,
    pub consistency_auditor: AtomicBool,
    pub rebalance_conductor: AtomicBool,
    pub catalog_sync: AtomicBool,
    pub reaper: AtomicBool,
}

impl ReadinessLedger {
    #[must_use]
    pub fn all_cycles_completed(&self) -> bool {
        self.heartbeat_sentinel.load(Ordering::Relaxed)
            && self.consistency_auditor.load(Ordering::Relaxed)
            && self.rebalance_conductor.load(Ordering::Relaxed)
            && self.catalog_sync.load(Ordering::Relaxed)
            && self.reaper.load(Ordering::Relaxed)
    }
}

/**
 * Contenedor de estado compartido (Thread-Safe) para el Orquestador.
 * Actúa como la placa base donde se conectan todos los estratos.
 */
#[derive(Clone)]
pub struct AppState {
    /// Cliente táctico hacia el Motor A (Gatekeeper).
    pub gatekeeper: GatekeeperClient,
    /// Contrato de configuración capturado en la ignición.
    pub config: Arc<OrchestratorConfig>,

    // --- REPOSITORIOS DE AUTORIDAD ---
    pub instance_repository: Arc<InstanceRepository>,
    pub assignment_repository: Arc<AssignmentRepository>,
    pub rebalance_repository: Arc<RebalanceRepository>,
    pub catalog_repository: Arc<CatalogRepository>,

    // --- ESTADO EFÍMERO DE PROTOCOLO ---
    /// Órdenes advisorias pendientes por nodo (drenadas en cada latido).
    command_queue: Arc<Mutex<HashMap<String, Vec<WorkerCommand>>>>,
    /// Contadores de update_stream acumulados entre latidos.
    processing_stats: Arc<Mutex<HashMap<String, ProcessingLedger>>>,
    /// Espejo en RAM del catálogo externo (refrescado por catalog_sync).
    catalog_snapshot: Arc<RwLock<Vec<i64>>>,
    /// Bóveda de replay idempotente (Idempotency-Key -> respuesta).
    idempotency_vault: Arc<Mutex<HashMap<String, IdempotentReply>>>,
    /// Journal acotado de defectos detectados por el Auditor.
    defect_journal: Arc<Mutex<VecDeque<DefectRecord>>>,

    // --- MANDO OPERATIVO ---
    pub current_system_mode: Arc<RwLock<SystemMode>>,
    pub readiness: Arc<ReadinessLedger>,

    // --- COORDINACIÓN DE REBALANCEO ---
    rebalance_signal: Arc<tokio::sync::Notify>,
    pending_rebalance_reason: Arc<Mutex<Option<RebalanceReason>>>,
    /// Candado de ejecución: a lo sumo un plan en curso.
    pub plan_execution_lock: Arc<tokio::sync::Mutex<()>>,
    last_plan_completed_at: Arc<Mutex<Option<Instant>>>,
}

impl AppState {
    /**
     * Forja una nueva instancia del Estado Maestro inyectando dependencias.
     */
    #[must_use]
    pub fn new(gatekeeper: GatekeeperClient, config: OrchestratorConfig) -> Self {
        debug!("🧬 [APP_STATE]: Executing sovereign ignition sequence V19.0...");

        Self {
            instance_repository: Arc::new(InstanceRepository::new(gatekeeper.clone())),
            assignment_repository: Arc::new(AssignmentRepository::new(gatekeeper.clone())),
            rebalance_repository: Arc::new(RebalanceRepository::new(gatekeeper.clone())),
            catalog_repository: Arc::new(CatalogRepository::new(gatekeeper.clone())),
            gatekeeper,
            config: Arc::new(config),
            command_queue: Arc::new(Mutex::new(HashMap::new())),
            processing_stats: Arc::new(Mutex::new(HashMap::new())),
            catalog_snapshot: Arc::new(RwLock::new(Vec::new())),
            idempotency_vault: Arc::new(Mutex::new(HashMap::new())),
            defect_journal: Arc::new(Mutex::new(VecDeque::with_capacity(DEFECT_JOURNAL_CAPACITY))),
            current_system_mode: Arc::new(RwLock::new(SystemMode::Operational)),
            readiness: Arc::new(ReadinessLedger::default()),
            rebalance_signal: Arc::new(tokio::sync::Notify::new()),
            pending_rebalance_reason: Arc::new(Mutex::new(None)),
            plan_execution_lock: Arc::new(tokio::sync::Mutex::new(())),
            last_plan_completed_at: Arc::new(Mutex::new(None)),
        }
    }

    // --- MODO OPERATIVO ---

    /// `Ok` en operación nominal; `Err(reason)` bajo mantenimiento.
    pub fn is_operational(&self) -> Result<(), String> {
        match &*self.current_system_mode.read().expect("system mode lock poisoned") {
            SystemMode::Operational => Ok(()),
            SystemMode::Maintenance(reason) => Err(reason.clone()),
        }
    }

    pub fn enter_maintenance(&self, reason: &str) {
        info!("🛑 [NEXUS]: Entering maintenance mode: {}", reason);
        *self.current_system_mode.write().expect("system mode lock poisoned") =
            SystemMode::Maintenance(reason.to_string());
    }

    pub fn exit_maintenance(&self) {
        info!("🟢 [NEXUS]: Resuming operational mode.");
        *self.current_system_mode.write().expect("system mode lock poisoned") =
            SystemMode::Operational;
    }

    // --- ÓRDENES ADVISORIAS ---

    pub fn enqueue_command(&self, instance_id: &str, command: WorkerCommand) {
        self.command_queue
            .lock()
            .expect("command queue lock poisoned")
            .entry(instance_id.to_string())
            .or_default()
            .push(command);
    }

    /// Drena (y vacía) la cola de órdenes de un nodo.
    #[must_use]
    pub fn drain_commands(&self, instance_id: &str) -> Vec<WorkerCommand> {
        self.command_queue
            .lock()
            .expect("command queue lock poisoned")
            .remove(instance_id)
            .unwrap_or_default()
    }

    /// Descarta las órdenes pendientes de un nodo retirado.
    pub fn purge_commands(&self, instance_id: &str) {
        self.command_queue
            .lock()
            .expect("command queue lock poisoned")
            .remove(instance_id);
    }

    // --- BIOMETRÍA DE PROCESAMIENTO ---

    /// Acumula un reporte de update_stream, deduplicando reintentos por
    /// (stream_id, timestamp). Devuelve false para duplicados ignorados.
    pub fn record_stream_outcome(&self, report: &UpdateStreamPayload) -> bool {
        use fingerswarm_domain_models::StreamProcessingStatus;

        let mut stats = self.processing_stats.lock().expect("stats lock poisoned");
        let ledger = stats.entry(report.id.clone()).or_default();

        let dedupe_key = (report.stream_id, report.timestamp.timestamp_millis());
        if !ledger.seen_updates.insert(dedupe_key) {
            return false;
        }

        match report.status {
            StreamProcessingStatus::Completed => ledger.processed_ok += 1,
            StreamProcessingStatus::Failed => ledger.processed_failed += 1,
            StreamProcessingStatus::Processing => {}
        }
        true
    }

    /// Funde los contadores acumulados en una señal [0,1] y los reinicia.
    /// `None` cuando no hubo actividad reportada desde el último latido.
    #[must_use]
    pub fn drain_processing_signal(&self, instance_id: &str) -> Option<f64> {
        let mut stats = self.processing_stats.lock().expect("stats lock poisoned");
        let ledger = stats.remove(instance_id)?;

        let total_updates = ledger.processed_ok + ledger.processed_failed;
        if total_updates == 0 {
            return None;
        }
        Some(ledger.processed_ok as f64 / total_updates as f64)
    }

    // --- CATÁLOGO (ESPEJO EXTERNO) ---

    pub fn refresh_catalog_snapshot(&self, active_streams: Vec<i64>) {
        *self.catalog_snapshot.write().expect("catalog lock poisoned") = active_streams;
    }

    #[must_use]
    pub fn catalog_view(&self) -> Vec<i64> {
        self.catalog_snapshot.read().expect("catalog lock poisoned").clone()
    }

    // --- JOURNAL DE DEFECTOS ---

    pub fn record_defect(&self, defect: DefectRecord) {
        let mut journal = self.defect_journal.lock().expect("defect journal lock poisoned");
        if journal.len() == DEFECT_JOURNAL_CAPACITY {
            journal.pop_front();
        }
        journal.push_back(defect);
    }

    #[must_use]
    pub fn defect_journal_view(&self) -> Vec<DefectRecord> {
        self.defect_journal
            .lock()
            .expect("defect journal lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    // --- BÓVEDA DE IDEMPOTENCIA ---

    #[must_use]
    pub fn idempotency_lookup(&self, key: &str) -> Option<IdempotentReply> {
        let vault = self.idempotency_vault.lock().expect("idempotency lock poisoned");
        vault.get(key).and_then(|reply| {
            let time_to_live = Duration::from_secs(self.config.idempotency_ttl_s);
            (reply.sealed_at.elapsed() < time_to_live).then(|| reply.clone())
        })
    }

    pub fn idempotency_seal(&self, key: String, status_code: u16, body_bytes: Vec<u8>) {
        self.idempotency_vault
            .lock()
            .expect("idempotency lock poisoned")
            .insert(key, IdempotentReply { status_code, body_bytes, sealed_at: Instant::now() });
    }

    /// Expulsa entradas vencidas de la bóveda (invocado por el Reaper).
    #[must_use]
    pub fn sweep_idempotency_vault(&self) -> usize {
        let time_to_live = Duration::from_secs(self.config.idempotency_ttl_s);
        let mut vault = self.idempotency_vault.lock().expect("idempotency lock poisoned");
        let population_before = vault.len();
        vault.retain(|_, reply| reply.sealed_at.elapsed() < time_to_live);
        population_before - vault.len()
    }

    // --- COORDINACIÓN DE REBALANCEO ---

    /// Solicita una evaluación de rebalanceo. Las señales se funden: la
    /// razón de mayor urgencia (pérdida de nodo) prevalece.
    pub fn request_rebalance(&self, reason: RebalanceReason) {
        {
            let mut pending =
                self.pending_rebalance_reason.lock().expect("rebalance reason lock poisoned");
            *pending = Some(match (*pending, reason) {
                (Some(RebalanceReason::LostInstance), _) => RebalanceReason::LostInstance,
                (_, requested) => requested,
            });
        }
        self.rebalance_signal.notify_one();
    }

    #[must_use]
    pub fn take_pending_rebalance_reason(&self) -> Option<RebalanceReason> {
        self.pending_rebalance_reason
            .lock()
            .expect("rebalance reason lock poisoned")
            .take()
    }

    #[must_use]
    pub fn rebalance_signal(&self) -> Arc<tokio::sync::Notify> {
        Arc::clone(&self.rebalance_signal)
    }

    pub fn seal_plan_completion(&self) {
        *self.last_plan_completed_at.lock().expect("plan clock lock poisoned") =
            Some(Instant::now());
    }

    /// El cooldown solo frena las evaluaciones del tick periódico.
    #[must_use]
    pub fn drift_cooldown_active(&self) -> bool {
        let cooldown_window = Duration::from_secs(self.config.rebalance_cooldown_s);
        self.last_plan_completed_at
            .lock()
            .expect("plan clock lock poisoned")
            .map(|sealed_at| sealed_at.elapsed() < cooldown_window)
            .unwrap_or(false)
    }
}

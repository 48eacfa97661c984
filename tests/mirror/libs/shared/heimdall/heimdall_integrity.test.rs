// [tests/mirror/libs/shared/heimdall/heimdall_integrity.test.rs]
/*!
 * =================================================================
 * APARATO: CERTIFICADOR DE OBSERVABILIDAD (V3.0 - PHOENIX READY)
 * CLASIFICACIÓN: TRINITY EVIDENCE // ESTRATO L4-MIRROR
 * RESPONSABILIDAD: AUDITORÍA DE IGNICIÓN DEL NERVIO ÓPTICO
 * =================================================================
 */

use fingerswarm_shared_heimdall::init_tracing;

#[cfg(test)]
mod tests {
    use super::*;

    /**
     * Certifica que la ignición de Heimdall es segura y que el rastro
     * estructurado fluye sin colapsar el proceso.
     */
    #[test]
    fn certify_heimdall_ignition_sequence() {
        println!("\n👁️  [INICIO]: Auditing Heimdall ignition...");

        init_tracing("fingerswarm_mirror_probe");

        tracing::info!("🧪 [PROBE]: Structured trace emitted post-ignition.");
        tracing::warn!(component = "mirror", "🧪 [PROBE]: Field-bearing event accepted.");

        println!("✅ [VEREDICTO]: Heimdall strata operational.");
    }
}

//! Game and ledger metrics in Prometheus text format

use crate::errors::{CasinoError, CasinoResult, InternalError};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

fn registration_error(e: prometheus::Error) -> CasinoError {
    CasinoError::Internal(InternalError::WriteFailed(format!("metrics registration: {}", e)))
}

#[derive(Clone)]
pub struct CasinoMetrics {
    registry: Registry,
    pub rounds_started: IntCounter,
    pub rounds_finished: IntCounterVec,
    pub active_rounds: IntGauge,
    pub coins_wagered: IntCounter,
    pub coins_paid_out: IntCounter,
    pub rejected_requests: IntCounterVec,
}

impl CasinoMetrics {
    pub fn new() -> CasinoResult<Self> {
        let registry = Registry::new_custom(Some("mines".to_string()), None)
            .map_err(registration_error)?;

        let rounds_started = IntCounter::new("rounds_started_total", "Rounds that reached play")
            .map_err(registration_error)?;
        let rounds_finished = IntCounterVec::new(
            Opts::new("rounds_finished_total", "Rounds by terminal status"),
            &["status"],
        )
        .map_err(registration_error)?;
        let active_rounds = IntGauge::new("active_rounds", "Rounds currently in play")
            .map_err(registration_error)?;
        let coins_wagered = IntCounter::new("coins_wagered_total", "Coins debited as bets")
            .map_err(registration_error)?;
        let coins_paid_out = IntCounter::new("coins_paid_out_total", "Coins credited by cash-outs")
            .map_err(registration_error)?;
        let rejected_requests = IntCounterVec::new(
            Opts::new("rejected_requests_total", "Requests rejected by error kind"),
            &["kind"],
        )
        .map_err(registration_error)?;

        registry.register(Box::new(rounds_started.clone())).map_err(registration_error)?;
        registry.register(Box::new(rounds_finished.clone())).map_err(registration_error)?;
        registry.register(Box::new(active_rounds.clone())).map_err(registration_error)?;
        registry.register(Box::new(coins_wagered.clone())).map_err(registration_error)?;
        registry.register(Box::new(coins_paid_out.clone())).map_err(registration_error)?;
        registry.register(Box::new(rejected_requests.clone())).map_err(registration_error)?;

        Ok(Self {
            registry,
            rounds_started,
            rounds_finished,
            active_rounds,
            coins_wagered,
            coins_paid_out,
            rejected_requests,
        })
    }

    pub fn record_rejection(&self, err: &CasinoError) {
        self.rejected_requests.with_label_values(&[err.kind()]).inc();
    }

    /// Prometheus exposition format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;

    #[test]
    fn test_render_contains_counters() {
        let metrics = CasinoMetrics::new().unwrap();
        metrics.rounds_started.inc();
        metrics.coins_wagered.inc_by(25);
        metrics.rounds_finished.with_label_values(&["lost"]).inc();
        metrics.record_rejection(&ValidationError::CellIndex { size: 25, actual: 30 }.into());

        let text = metrics.render();
        assert!(text.contains("mines_rounds_started_total 1"));
        assert!(text.contains("mines_coins_wagered_total 25"));
        assert!(text.contains("mines_rounds_finished_total{status=\"lost\"} 1"));
        assert!(text.contains("mines_rejected_requests_total{kind=\"validation\"} 1"));
    }
}

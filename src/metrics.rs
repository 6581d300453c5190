//! Prometheus metrics for plays and settlement

use crate::errors::FailureKind;
use crate::games::types::PlayResult;
use prometheus::{
    Counter, Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

pub struct PlayMetrics {
    registry: Registry,
    plays_total: IntCounterVec,
    play_failures_total: IntCounterVec,
    settlement_seconds: Histogram,
    wagered_total: Counter,
    prizes_paid_total: Counter,
}

impl PlayMetrics {
    /// Create a metrics set on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("raspadinha".to_string()), None)?;

        let plays_total = IntCounterVec::new(
            Opts::new("plays_total", "Settled plays by outcome"),
            &["outcome"],
        )?;
        let play_failures_total = IntCounterVec::new(
            Opts::new("play_failures_total", "Rejected or failed plays by failure kind"),
            &["kind"],
        )?;
        let settlement_seconds = Histogram::with_opts(
            HistogramOpts::new("settlement_seconds", "Wall time of one play, lock wait included")
                .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0, 2.5]),
        )?;
        let wagered_total = Counter::new("wagered_total", "Sum of wagers debited by plays")?;
        let prizes_paid_total = Counter::new("prizes_paid_total", "Sum of prizes credited by plays")?;

        registry.register(Box::new(plays_total.clone()))?;
        registry.register(Box::new(play_failures_total.clone()))?;
        registry.register(Box::new(settlement_seconds.clone()))?;
        registry.register(Box::new(wagered_total.clone()))?;
        registry.register(Box::new(prizes_paid_total.clone()))?;

        Ok(Self {
            registry,
            plays_total,
            play_failures_total,
            settlement_seconds,
            wagered_total,
            prizes_paid_total,
        })
    }

    pub fn record_play(&self, result: &PlayResult, wager: Decimal, elapsed: Duration) {
        let outcome = if result.is_winner { "win" } else { "loss" };
        self.plays_total.with_label_values(&[outcome]).inc();
        self.settlement_seconds.observe(elapsed.as_secs_f64());
        self.wagered_total.inc_by(wager.to_f64().unwrap_or(0.0));
        self.prizes_paid_total
            .inc_by(result.prize_value.to_f64().unwrap_or(0.0));
    }

    pub fn record_failure(&self, kind: FailureKind, elapsed: Duration) {
        self.play_failures_total
            .with_label_values(&[kind.as_str()])
            .inc();
        self.settlement_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn plays(&self, outcome: &str) -> u64 {
        self.plays_total.with_label_values(&[outcome]).get()
    }

    pub fn failures(&self, kind: FailureKind) -> u64 {
        self.play_failures_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    /// Text exposition format for `GET /metrics`
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

//! Prometheus metrics for the bridge daemon.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;

use esbridge_elastic::BulkOutcome;

/// Why a record was dropped before reaching the bulk API.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ReasonLabel(pub &'static str);

pub const FAIL_VALIDATE: ReasonLabel = ReasonLabel("fail_validate");
pub const MISSING_INDEX: ReasonLabel = ReasonLabel("missing_index");

impl prometheus_client::encoding::EncodeLabelSet for ReasonLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("reason", self.0).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Per-item bulk API result bucket.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResultLabel(pub &'static str);

impl prometheus_client::encoding::EncodeLabelSet for ResultLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("result", self.0).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct BridgeMetrics {
    pub records: Counter,
    pub invalid_records: Family<ReasonLabel, Counter>,
    pub bulk_action: Family<ResultLabel, Counter>,
    pub submit_batch: Histogram,
    pub registry: Arc<Registry>,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let records = Counter::default();
        registry.register(
            "esbridge_records",
            "Number of kafka records processed",
            records.clone(),
        );

        let invalid_records = Family::<ReasonLabel, Counter>::default();
        registry.register(
            "esbridge_invalid_records",
            "Number of requests that could not be processed",
            invalid_records.clone(),
        );

        let bulk_action = Family::<ResultLabel, Counter>::default();
        registry.register(
            "esbridge_bulk_action",
            "Number of bulk actions by per-item result",
            bulk_action.clone(),
        );

        let submit_batch = Histogram::new(exponential_buckets(0.005, 2.0, 14));
        registry.register(
            "esbridge_submit_batch_seconds",
            "Time taken to submit a batch from kafka to elasticsearch",
            submit_batch.clone(),
        );

        // Pre-create every label series so they all export as 0 from
        // process start rather than appearing on first increment.
        for reason in [FAIL_VALIDATE, MISSING_INDEX] {
            invalid_records.get_or_create(&reason);
        }
        for outcome in BulkOutcome::ALL {
            bulk_action.get_or_create(&ResultLabel(outcome.as_label()));
        }

        Self {
            records,
            invalid_records,
            bulk_action,
            submit_batch,
            registry: Arc::new(registry),
        }
    }

    /// Count one dropped record.
    pub fn invalid_record(&self, reason: ReasonLabel) {
        self.invalid_records.get_or_create(&reason).inc();
    }

    /// Count one classified bulk response item.
    pub fn bulk_outcome(&self, outcome: BulkOutcome) {
        self.bulk_action
            .get_or_create(&ResultLabel(outcome.as_label()))
            .inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        encode(&mut buf, &self.registry).unwrap();
        buf
    }
}

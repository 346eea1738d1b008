//! Validation and dispatch of decoded items.
//!
//! [`Pipeline`] owns the collaborators shared by every connection: the
//! batch decoder, validator, optional order checker, quarantine sink and
//! dispatcher, plus the process-wide [`IngestCounters`]. Item-level
//! failures stop here; they are counted, quarantined where a line exists,
//! and never reach the connection loop.

use std::{fmt, sync::Arc};

use crate::{
    config::IngestConfig,
    decode::{BatchDecoder, PickleDecoder, Value},
    dispatch::Dispatcher,
    metrics::IngestCounters,
    normalize::{ItemError, normalize},
    order::{LastSeenOrder, OrderChecker, OrderError},
    quarantine::{BadMetrics, QuarantineSink},
    validate::{PacketValidator, ValidationError, Validator},
};

/// What happened to a single item.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemOutcome {
    /// Validated and forwarded to the dispatcher.
    Dispatched,
    /// Rejected before validation because of its shape or scalar types.
    Invalid(ItemError),
    /// Rejected by the validator and quarantined.
    Rejected(ValidationError),
    /// Rejected by the order checker and quarantined.
    OutOfOrder(OrderError),
}

/// Shared per-server processing state.
#[derive(Clone)]
pub struct Pipeline {
    config: IngestConfig,
    decoder: Arc<dyn BatchDecoder>,
    validator: Arc<dyn Validator>,
    order: Arc<dyn OrderChecker>,
    quarantine: Arc<dyn QuarantineSink>,
    dispatcher: Arc<dyn Dispatcher>,
    counters: Arc<IngestCounters>,
}

impl Pipeline {
    /// Build a pipeline with the default decoder, validator, order checker
    /// and quarantine.
    ///
    /// The default quarantine is a [`BadMetrics`] with its default limits.
    /// To read quarantined records, build a `BadMetrics` yourself and pass
    /// it to [`Pipeline::with_quarantine`].
    pub fn new(
        config: IngestConfig,
        dispatcher: Arc<dyn Dispatcher>,
        counters: Arc<IngestCounters>,
    ) -> Self {
        Self {
            config,
            decoder: Arc::new(PickleDecoder),
            validator: Arc::new(PacketValidator),
            order: Arc::new(LastSeenOrder::new()),
            quarantine: Arc::new(BadMetrics::new()),
            dispatcher,
            counters,
        }
    }

    /// Replace the batch decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn BatchDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Replace the validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replace the order checker. It is only consulted when
    /// [`IngestConfig::validate_order`] is set.
    #[must_use]
    pub fn with_order_checker(mut self, order: Arc<dyn OrderChecker>) -> Self {
        self.order = order;
        self
    }

    /// Replace the quarantine sink.
    #[must_use]
    pub fn with_quarantine(mut self, quarantine: Arc<dyn QuarantineSink>) -> Self {
        self.quarantine = quarantine;
        self
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &IngestConfig { &self.config }

    /// Decoder used for frame payloads.
    #[must_use]
    pub fn decoder(&self) -> &dyn BatchDecoder { self.decoder.as_ref() }

    /// Shared counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<IngestCounters> { &self.counters }

    /// Process every item of a decoded batch in order.
    pub fn process_batch(&self, items: &[Value]) {
        self.counters.frame_decoded();
        for item in items {
            self.process_item(item);
        }
    }

    /// Normalise, validate, order-check and dispatch one item.
    pub fn process_item(&self, item: &Value) -> ItemOutcome {
        self.counters.item_seen();

        let observation = match normalize(item) {
            Ok(observation) => observation,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed item");
                self.counters.item_invalid();
                return ItemOutcome::Invalid(e);
            }
        };
        let line = observation.line();

        let validated =
            match self
                .validator
                .validate(&line, self.config.legacy_level, self.config.m20_level)
            {
                Ok(validated) => validated,
                Err(e) => {
                    tracing::debug!(error = %e, "metric failed packet validation");
                    self.quarantine.record(&e.key, &line, &e);
                    self.counters.item_invalid();
                    return ItemOutcome::Rejected(e);
                }
            };

        if self.config.validate_order
            && let Err(e) = self.order.check_order(&validated.key, validated.timestamp)
        {
            tracing::debug!(key = %validated.key, error = %e, "metric failed order validation");
            self.quarantine.record(&validated.key, &line, &e);
            self.counters.item_out_of_order();
            return ItemOutcome::OutOfOrder(e);
        }

        self.dispatcher
            .dispatch(&line, validated.value, validated.timestamp);
        self.counters.item_dispatched();
        ItemOutcome::Dispatched
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

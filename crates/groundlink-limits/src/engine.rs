use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use groundlink_packet::{
    ConversionError, ItemDefinition, Packet, PacketError, PacketIdentity, Value, ValueType,
    DEFAULT_LIMITS_SET,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::control::{ItemKey, LimitsControl};
use crate::error::ResponseError;
use crate::response::{FailureSink, LimitsResponse, TracingFailureSink};
use crate::state::{classify, ItemLimitsState, LimitsState};

/// A confirmed change of an item's limits state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitsTransition {
    pub item: ItemKey,
    pub previous: LimitsState,
    pub current: LimitsState,
    /// Converted value that confirmed the transition.
    pub value: f64,
}

/// Result of [`LimitsEngine::evaluate`]: the confirmed transitions and the
/// responses they trigger, still to be run.
///
/// Responses may call back into whatever owns the engine, so a caller that
/// keeps the engine behind a lock releases it before [`LimitsCheck::respond`].
#[must_use = "responses only run through LimitsCheck::respond"]
pub struct LimitsCheck {
    transitions: Vec<LimitsTransition>,
    pending: Vec<PendingResponse>,
    sink: Arc<dyn FailureSink>,
}

struct PendingResponse {
    response: Arc<dyn LimitsResponse>,
    key: ItemKey,
    previous: LimitsState,
}

impl LimitsCheck {
    pub fn transitions(&self) -> &[LimitsTransition] {
        &self.transitions
    }

    pub fn pending_responses(&self) -> usize {
        self.pending.len()
    }

    /// Run the pending responses in transition order and hand back the
    /// transitions.
    pub fn respond(self, packet: &Packet) -> Vec<LimitsTransition> {
        for pending in &self.pending {
            pending.run(packet, self.sink.as_ref());
        }
        self.transitions
    }
}

impl fmt::Debug for LimitsCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitsCheck")
            .field("transitions", &self.transitions)
            .field("pending_responses", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl PendingResponse {
    fn run(&self, packet: &Packet, sink: &dyn FailureSink) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.response.handle(packet, &self.key.item, self.previous)
        }));
        let err = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(payload) => ResponseError::Panicked(panic_message(payload)),
        };
        sink.response_failed(&self.key, &err);
    }
}

/// Evaluates telemetry packets against item limits.
///
/// One engine serves any number of packet streams; it is the only writer of
/// item limits states, so callers that deliver from several threads share it
/// behind a lock.
pub struct LimitsEngine {
    states: HashMap<ItemKey, ItemLimitsState>,
    responses: HashMap<ItemKey, Arc<dyn LimitsResponse>>,
    limits_set: String,
    control: LimitsControl,
    sink: Arc<dyn FailureSink>,
}

impl Default for LimitsEngine {
    fn default() -> Self {
        Self {
            states: HashMap::new(),
            responses: HashMap::new(),
            limits_set: DEFAULT_LIMITS_SET.to_string(),
            control: LimitsControl::new(),
            sink: Arc::new(TracingFailureSink),
        }
    }
}

impl LimitsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share enable/disable switches with limits groups or other engines.
    pub fn with_control(mut self, control: LimitsControl) -> Self {
        self.control = control;
        self
    }

    pub fn control(&self) -> &LimitsControl {
        &self.control
    }

    /// Response run when `item`'s confirmed state changes. Replaces any previous one.
    pub fn set_response(&mut self, item: ItemKey, response: impl LimitsResponse + 'static) {
        self.responses.insert(item, Arc::new(response));
    }

    /// Select the active limits set. Items without thresholds for it use DEFAULT.
    pub fn set_limits_set(&mut self, name: &str) {
        let name = name.to_ascii_uppercase();
        info!(limits_set = %name, "limits set selected");
        self.limits_set = name;
    }

    pub fn limits_set(&self) -> &str {
        &self.limits_set
    }

    pub fn enable_item(&self, item: &ItemKey) {
        self.control.enable(item);
    }

    /// Stop evaluating `item`. Its confirmed state is kept.
    pub fn disable_item(&self, item: &ItemKey) {
        self.control.disable(item);
    }

    /// Confirmed state of `item`; STALE when it has never been evaluated.
    pub fn state(&self, item: &ItemKey) -> LimitsState {
        self.item_state(item).confirmed
    }

    pub fn item_state(&self, item: &ItemKey) -> ItemLimitsState {
        self.states.get(item).copied().unwrap_or_default()
    }

    /// Items whose confirmed state is yellow or red, in key order.
    pub fn out_of_limits(&self) -> Vec<(ItemKey, LimitsState)> {
        let mut items: Vec<_> = self
            .states
            .iter()
            .filter(|(_, state)| state.confirmed.is_out_of_limits())
            .map(|(key, state)| (key.clone(), state.confirmed))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Mark every item of `packet` STALE, e.g. when its data stops arriving.
    pub fn set_stale(&mut self, packet: &PacketIdentity) {
        let mut count = 0usize;
        for (_, state) in self
            .states
            .iter_mut()
            .filter(|(key, _)| &key.packet == packet)
        {
            state.set_stale();
            count += 1;
        }
        debug!(packet = %packet, items = count, "limits states set stale");
    }

    /// Classify every enabled limits item of `packet` and return the confirmed
    /// transitions, running each transitioning item's response first.
    ///
    /// Items that cannot be read are reported to the failure sink and skipped;
    /// the rest of the packet is still evaluated.
    pub fn check(&mut self, packet: &mut Packet) -> Vec<LimitsTransition> {
        self.evaluate(packet).respond(packet)
    }

    /// Like [`LimitsEngine::check`], but leaves the responses to the caller.
    /// States are updated before this returns.
    pub fn evaluate(&mut self, packet: &mut Packet) -> LimitsCheck {
        let definition = Arc::clone(packet.definition());
        let mut transitions = Vec::new();
        let mut pending = Vec::new();

        for item in definition.limits_items() {
            let Some(limits) = item.limits() else {
                continue;
            };
            let key = ItemKey::of(definition.identity(), item.name());
            if !self.control.is_enabled(&key, limits.enabled()) {
                continue;
            }

            let value = match numeric_value(packet, item) {
                Ok(value) => value,
                Err(err) => {
                    self.sink.read_failed(&key, &err);
                    continue;
                }
            };

            let classification = classify(value, limits.thresholds(&self.limits_set));
            let Some(previous) = self
                .states
                .entry(key.clone())
                .or_default()
                .observe(classification, limits.persistence())
            else {
                continue;
            };

            if classification.is_out_of_limits() {
                warn!(item = %key, from = %previous, to = %classification, value, "item out of limits");
            } else {
                info!(item = %key, from = %previous, to = %classification, value, "limits state changed");
            }

            // Leaving STALE into a green state is not worth a response.
            if previous != LimitsState::Stale || classification.is_out_of_limits() {
                if let Some(response) = self.responses.get(&key) {
                    pending.push(PendingResponse {
                        response: Arc::clone(response),
                        key: key.clone(),
                        previous,
                    });
                }
            }

            transitions.push(LimitsTransition {
                item: key,
                previous,
                current: classification,
                value,
            });
        }

        LimitsCheck {
            transitions,
            pending,
            sink: Arc::clone(&self.sink),
        }
    }
}

impl fmt::Debug for LimitsEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimitsEngine")
            .field("limits_set", &self.limits_set)
            .field("items", &self.states.len())
            .field("responses", &self.responses.len())
            .finish_non_exhaustive()
    }
}

/// Converted value of `item` as a number. State names map back to their values.
fn numeric_value(packet: &mut Packet, item: &ItemDefinition) -> Result<f64, PacketError> {
    let converted = packet.read(item.name(), ValueType::Converted)?;
    let number = match &converted {
        Value::String(state) => item.state_value(state).and_then(Value::as_f64),
        other => other.as_f64(),
    };
    number
        .filter(|number| !number.is_nan())
        .ok_or_else(|| PacketError::Conversion {
            item: item.name().to_string(),
            source: ConversionError::NotNumeric(converted.kind()),
        })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

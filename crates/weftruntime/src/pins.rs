//! Live pin state for one run.
//!
//! [`OutputPin`] is an ordered multicast channel: a push is delivered to
//! every live subscriber in subscription order, exactly once, with no replay.
//! [`InputPin`] holds what its firing mode needs and nothing more.

use crate::graph::{PinSettings, PinTarget};
use weftcore::{InputMode, Value};

/// Handle returned by [`OutputPin::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(usize);

#[derive(Debug)]
pub struct OutputPin {
    id: String,
    subscribers: Vec<Option<PinTarget>>,
}

impl OutputPin {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscribe(&mut self, target: PinTarget) -> SubscriptionHandle {
        self.subscribers.push(Some(target));
        SubscriptionHandle(self.subscribers.len() - 1)
    }

    /// Returns false if the handle was already unsubscribed.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        self.subscribers
            .get_mut(handle.0)
            .and_then(Option::take)
            .is_some()
    }

    pub fn unsubscribe_all(&mut self) {
        self.subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|s| s.is_some()).count()
    }

    /// One delivery per live subscriber, in subscription order.
    pub fn push(&self, value: &Value) -> Vec<(PinTarget, Value)> {
        self.subscribers
            .iter()
            .flatten()
            .map(|target| (target.clone(), value.clone()))
            .collect()
    }
}

#[derive(Debug)]
pub struct InputPin {
    mode: InputMode,
    required: bool,
    sticky: bool,
    /// Pending values of an "all" pin, one slot per contributing connection,
    /// tagged with an arrival sequence number.
    slots: Vec<Option<(u64, Value)>>,
    /// Last value seen, read by firings that do not consume this pin.
    latest: Option<Value>,
    arrivals: u64,
}

impl InputPin {
    pub fn new(settings: &PinSettings) -> Self {
        let slots = match settings.mode {
            InputMode::All => vec![None; settings.slots.max(1)],
            InputMode::Any => Vec::new(),
        };
        Self {
            mode: settings.mode,
            required: settings.required,
            sticky: settings.sticky,
            slots,
            latest: settings.default_value.clone(),
            arrivals: 0,
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Record an arrival on connection `slot`.
    ///
    /// An "any" pin keeps nothing here: its arrivals are queued by the
    /// scheduler and become the retained value only once they fire.
    pub fn receive(&mut self, slot: usize, value: Value) {
        if self.mode == InputMode::Any {
            return;
        }
        self.arrivals += 1;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some((self.arrivals, value.clone()));
        self.latest = Some(value);
    }

    /// Set the retained value directly (used when a queued "any" arrival fires).
    pub fn set_latest(&mut self, value: Value) {
        self.latest = Some(value);
    }

    /// A required, non-sticky "all" pin needs a fresh arrival before every firing.
    pub fn gates_firing(&self) -> bool {
        self.mode == InputMode::All && self.required && !self.sticky
    }

    /// Pins that keep their last value across firings.
    pub fn retains(&self) -> bool {
        !self.gates_firing()
    }

    /// Every contributing connection has delivered since the last firing.
    pub fn is_fresh(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(Option::is_some)
    }

    /// Value a firing would read from this pin right now.
    ///
    /// A gating pin has no value until every slot is filled; with several
    /// contributing connections it reads the most recent arrival among them.
    pub fn current(&self) -> Option<&Value> {
        if self.retains() {
            self.latest.as_ref()
        } else if !self.is_fresh() {
            None
        } else {
            self.slots
                .iter()
                .flatten()
                .max_by_key(|(seq, _)| *seq)
                .map(|(_, value)| value)
        }
    }

    pub fn has_value(&self) -> bool {
        self.current().is_some()
    }

    /// Clear all pending slots at once, after a firing consumed them.
    pub fn consume(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }
}

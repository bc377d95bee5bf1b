use tracing::{debug, trace};

use crate::events::RoundEvent;
use crate::force::lerp;
use crate::instrument::Instrument;
use crate::market_event::MarketEvent;
use crate::types::{InstrumentId, SlotId};

/// Start and target price of one event on one instrument, captured on the
/// first query that sees non-zero force.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAnchor {
    pub start: f64,
    pub target: f64,
}

struct Slot {
    event: MarketEvent,
    /// One entry per instrument that has queried this event. Market-wide
    /// events may hold several; instrument-specific events hold at most one.
    anchors: Vec<(InstrumentId, PriceAnchor)>,
}

impl Slot {
    fn anchor_for(&self, id: InstrumentId) -> Option<PriceAnchor> {
        self.anchors.iter().find(|(i, _)| *i == id).map(|(_, a)| *a)
    }
}

/// Ledger of active events for the current round.
///
/// Slots are append-only within a round and addressed by `SlotId`; retired
/// slots are emptied in place so surviving ids stay valid. Iteration is in
/// slot order, which is firing order.
#[derive(Default)]
pub struct EventEffects {
    slots: Vec<Option<Slot>>,
    notices: Vec<RoundEvent>,
}

impl EventEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every event and cached price. Pending notices are discarded.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.notices.clear();
    }

    /// Take ownership of a fired event and emit `EventStarted`.
    pub fn add(&mut self, event: MarketEvent) -> SlotId {
        let slot = SlotId(self.slots.len());
        debug!(
            slot = slot.0,
            kind = event.kind.label(),
            effect = event.base_effect,
            duration = event.duration,
            "event started"
        );
        self.notices.push(RoundEvent::EventStarted {
            slot,
            kind: event.kind,
            target: event.target,
            effect: event.base_effect,
        });
        self.slots.push(Some(Slot { event, anchors: Vec::new() }));
        slot
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn event(&self, slot: SlotId) -> Option<&MarketEvent> {
        self.slots.get(slot.0)?.as_ref().map(|s| &s.event)
    }

    /// Ids of live events, in firing order.
    pub fn active_slots(&self) -> Vec<SlotId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| SlotId(i))
            .collect()
    }

    /// Cached anchor of `slot` on `instrument`, if one has been captured.
    pub fn anchor(&self, slot: SlotId, instrument: InstrumentId) -> Option<PriceAnchor> {
        self.slots.get(slot.0)?.as_ref()?.anchor_for(instrument)
    }

    /// Event-adjusted target price of `slot` for `instrument`.
    ///
    /// The first query with non-zero force captures `instrument.price` as the
    /// start price; later queries blend between the cached start and target,
    /// so the result depends only on the event's elapsed time and never on
    /// how many ticks it took to get there. Returns `None` when the slot is
    /// empty, does not apply to the instrument, or has not yet produced force.
    pub fn target_price(&mut self, slot: SlotId, instrument: &Instrument) -> Option<f64> {
        let entry = self.slots.get_mut(slot.0)?.as_mut()?;
        if !entry.event.target.applies_to(instrument.id) || !entry.event.is_active() {
            return None;
        }

        let force = entry.event.force();
        let anchor = match entry.anchor_for(instrument.id) {
            Some(anchor) => anchor,
            None => {
                if force <= 0.0 {
                    return None;
                }
                let start = instrument.price;
                let anchor = PriceAnchor { start, target: start * (1.0 + entry.event.base_effect) };
                trace!(slot = slot.0, start, target = anchor.target, "captured price anchor");
                entry.anchors.push((instrument.id, anchor));
                anchor
            }
        };

        let price = match entry.event.current_phase() {
            None => lerp(anchor.start, anchor.target, force),
            Some(pos) => {
                let phases = entry.event.phases().unwrap_or(&[]);
                let baseline = phases[..pos.index]
                    .iter()
                    .fold(anchor.start, |p, ph| p * (1.0 + ph.target_percent));
                let phase_target = baseline * (1.0 + phases[pos.index].target_percent);
                lerp(baseline, phase_target, force)
            }
        };
        Some(price)
    }

    /// Target prices of every live event that applies to `instrument`, in
    /// firing order.
    pub fn event_targets(&mut self, instrument: &Instrument) -> Vec<f64> {
        (0..self.slots.len())
            .filter_map(|i| self.target_price(SlotId(i), instrument))
            .collect()
    }

    /// Advance every live event by `dt` and retire the ones that finished,
    /// emitting `EventEnded` for each.
    pub fn advance(&mut self, dt: f64) {
        for (i, cell) in self.slots.iter_mut().enumerate() {
            let Some(slot) = cell.as_mut() else { continue };
            slot.event.advance(dt);
            if !slot.event.is_active() {
                debug!(slot = i, kind = slot.event.kind.label(), "event ended");
                self.notices.push(RoundEvent::EventEnded {
                    slot: SlotId(i),
                    kind: slot.event.kind,
                    target: slot.event.target,
                });
                *cell = None;
            }
        }
    }

    /// Take the lifecycle notices emitted since the last drain.
    pub fn drain_notices(&mut self) -> Vec<RoundEvent> {
        std::mem::take(&mut self.notices)
    }
}

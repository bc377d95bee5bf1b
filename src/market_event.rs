use crate::catalog::EventKind;
use crate::force::{ramp_hold_force, single_phase_force};
use crate::phases::EventPhase;
use crate::types::EventTarget;

/// Where a query landed inside an event's timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhasePosition {
    pub index: usize,
    /// Seconds since the phase began.
    pub elapsed_in_phase: f64,
}

/// Runtime state of one fired event. Owned by the effect ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub kind: EventKind,
    pub target: EventTarget,
    pub base_effect: f64,
    pub duration: f64,
    elapsed: f64,
    phases: Option<Vec<EventPhase>>,
    /// `(elapsed, phase index)` of the last phase lookup.
    phase_cache: Option<(f64, usize)>,
}

impl MarketEvent {
    pub fn new(
        kind: EventKind,
        target: EventTarget,
        base_effect: f64,
        duration: f64,
        phases: Option<Vec<EventPhase>>,
    ) -> Self {
        MarketEvent {
            kind,
            target,
            base_effect,
            duration,
            elapsed: 0.0,
            phases: phases.filter(|p| !p.is_empty()),
            phase_cache: None,
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn phases(&self) -> Option<&[EventPhase]> {
        self.phases.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.elapsed < self.duration
    }

    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt;
    }

    /// Locate the phase containing the current elapsed time. Past the last
    /// boundary the final phase is reported. `None` for single-phase events.
    pub fn current_phase(&mut self) -> Option<PhasePosition> {
        let phases = self.phases.as_ref()?;

        let index = match self.phase_cache {
            Some((at, index)) if at == self.elapsed => index,
            _ => {
                let mut boundary = 0.0;
                let mut index = phases.len() - 1;
                for (i, phase) in phases.iter().enumerate() {
                    boundary += phase.phase_duration;
                    if self.elapsed < boundary {
                        index = i;
                        break;
                    }
                }
                self.phase_cache = Some((self.elapsed, index));
                index
            }
        };

        let phase_start: f64 = phases[..index].iter().map(|p| p.phase_duration).sum();
        Some(PhasePosition { index, elapsed_in_phase: self.elapsed - phase_start })
    }

    /// Blend factor at the current elapsed time. For multi-phase events this
    /// is the force within the active phase.
    pub fn force(&mut self) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        match self.current_phase() {
            None => single_phase_force(self.elapsed, self.duration),
            Some(pos) => {
                let phase_duration = self
                    .phases
                    .as_ref()
                    .map(|p| p[pos.index].phase_duration)
                    .unwrap_or(self.duration);
                ramp_hold_force(pos.elapsed_in_phase, phase_duration)
            }
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::catalog::EventKind;

/// One leg of a multi-phase event.
///
/// `target_percent` is applied to the price the phase starts from, and that
/// price is itself derived from the event's single start-price capture, so
/// the legs compound: the net move of the whole event is `Π(1 + target)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventPhase {
    pub target_percent: f64,
    pub phase_duration: f64,
}

/// Second-leg move that lands the instrument on `final_ratio` of its
/// pre-event price after a first leg of `first_effect`.
///
/// Satisfies `(1 + first_effect) * (1 + e2) == final_ratio`.
pub fn second_phase_target(first_effect: f64, final_ratio: f64) -> f64 {
    final_ratio / (1.0 + first_effect) - 1.0
}

/// Build the phase list for a two-act kind, or `None` for single-phase kinds.
///
/// Deterministic: consumes no randomness.
pub fn synthesize_phases(kind: EventKind, effect: f64, duration: f64) -> Option<Vec<EventPhase>> {
    let shape = kind.two_act()?;
    let first_duration = duration * shape.first_phase_fraction;
    Some(vec![
        EventPhase { target_percent: effect, phase_duration: first_duration },
        EventPhase {
            target_percent: second_phase_target(effect, shape.final_ratio),
            phase_duration: duration - first_duration,
        },
    ])
}

/// Sum of phase durations; should equal the owning event's duration.
pub fn total_duration(phases: &[EventPhase]) -> f64 {
    phases.iter().map(|p| p.phase_duration).sum()
}

/// Net price ratio after every phase has fully played out.
pub fn net_ratio(phases: &[EventPhase]) -> f64 {
    phases.iter().fold(1.0, |acc, p| acc * (1.0 + p.target_percent))
}

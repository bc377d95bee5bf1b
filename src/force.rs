//! Force curves: map elapsed time to a [0, 1] blend factor.

/// Fraction of the duration spent ramping in.
pub const ATTACK: f64 = 0.15;
/// Normalised time at which the tail-off begins.
pub const RELEASE_START: f64 = 0.85;

/// Attack-hold-release curve for single-phase events.
///
/// Zero outside the open interval `(0, duration)`. Ramps linearly to 1 over
/// the first 15 %, holds, then falls linearly over the last 15 %.
pub fn single_phase_force(elapsed: f64, duration: f64) -> f64 {
    if duration <= 0.0 || elapsed <= 0.0 || elapsed >= duration {
        return 0.0;
    }
    let t = elapsed / duration;
    if t <= ATTACK {
        t / ATTACK
    } else if t <= RELEASE_START {
        1.0
    } else {
        (1.0 - (t - RELEASE_START) / ATTACK).max(0.0)
    }
}

/// Ramp-and-hold curve for one phase of a multi-phase event.
///
/// No tail-off: the price locks on the phase target until the next phase
/// takes over.
pub fn ramp_hold_force(elapsed_in_phase: f64, phase_duration: f64) -> f64 {
    if elapsed_in_phase <= 0.0 {
        return 0.0;
    }
    if phase_duration <= 0.0 {
        return 1.0;
    }
    let t = elapsed_in_phase / phase_duration;
    if t <= ATTACK { t / ATTACK } else { 1.0 }
}

pub fn lerp(from: f64, to: f64, force: f64) -> f64 {
    from + (to - from) * force
}

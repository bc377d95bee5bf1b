use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Tier;

/// Rarity weights at or below this value mark an entry as rare.
pub const RARE_THRESHOLD: f64 = 0.2;

/// Closed set of hand-authored event shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    EarningsBeat,
    EarningsMiss,
    AnalystUpgrade,
    AnalystDowngrade,
    Buyback,
    /// Directional: sign decided by a coin flip.
    Rumor,
    /// Directional: sign decided by a coin flip.
    SectorRotation,
    FlashCrash,
    ShortSqueeze,
    MarketCrash,
    PumpAndDump,
    CrashAndRecover,
}

/// Fixed two-act structure for compound kinds.
///
/// The split and final ratio are per-kind constants. Moving them onto
/// `EventDefinition` is the extension point if the catalog ever needs
/// several variants of the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoActShape {
    /// Share of the event duration given to the first phase.
    pub first_phase_fraction: f64,
    /// Price after both phases, as a fraction of the pre-event price.
    pub final_ratio: f64,
}

impl EventKind {
    pub fn is_directional(self) -> bool {
        matches!(self, EventKind::Rumor | EventKind::SectorRotation)
    }

    pub fn is_market_wide(self) -> bool {
        matches!(self, EventKind::MarketCrash)
    }

    pub fn two_act(self) -> Option<TwoActShape> {
        match self {
            EventKind::PumpAndDump => Some(TwoActShape { first_phase_fraction: 0.6, final_ratio: 0.80 }),
            EventKind::CrashAndRecover => Some(TwoActShape { first_phase_fraction: 0.6, final_ratio: 0.95 }),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EventKind::EarningsBeat => "earnings-beat",
            EventKind::EarningsMiss => "earnings-miss",
            EventKind::AnalystUpgrade => "analyst-upgrade",
            EventKind::AnalystDowngrade => "analyst-downgrade",
            EventKind::Buyback => "buyback",
            EventKind::Rumor => "rumor",
            EventKind::SectorRotation => "sector-rotation",
            EventKind::FlashCrash => "flash-crash",
            EventKind::ShortSqueeze => "short-squeeze",
            EventKind::MarketCrash => "market-crash",
            EventKind::PumpAndDump => "pump-and-dump",
            EventKind::CrashAndRecover => "crash-and-recover",
        }
    }
}

/// Immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub kind: EventKind,
    /// Signed fractional move, e.g. -0.30.
    pub min_effect: f64,
    pub max_effect: f64,
    /// Seconds.
    pub duration: f64,
    /// Positive sampling weight.
    pub rarity: f64,
    pub tiers: Vec<Tier>,
}

impl EventDefinition {
    pub fn is_rare(&self) -> bool {
        self.rarity <= RARE_THRESHOLD
    }

    pub fn available_in(&self, tier: Tier) -> bool {
        self.tiers.contains(&tier)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("no entries available for tier {0:?}")]
    EmptyTier(Tier),
    #[error("{kind:?} has weight {rarity}; weights must be finite and positive")]
    BadWeight { kind: EventKind, rarity: f64 },
    #[error("{kind:?} has effect range [{min_effect}, {max_effect}]")]
    BadRange { kind: EventKind, min_effect: f64, max_effect: f64 },
    #[error("{kind:?} has duration {duration}")]
    BadDuration { kind: EventKind, duration: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub entries: Vec<EventDefinition>,
}

impl Default for Catalog {
    fn default() -> Self {
        default_catalog()
    }
}

impl Catalog {
    /// Entries a round of `tier` may draw from, in catalog order.
    pub fn available_for(&self, tier: Tier) -> Vec<&EventDefinition> {
        self.entries.iter().filter(|d| d.available_in(tier)).collect()
    }

    pub fn get(&self, kind: EventKind) -> Option<&EventDefinition> {
        self.entries.iter().find(|d| d.kind == kind)
    }

    /// Every tier must have at least one entry, and every entry a usable
    /// weight, range and duration, so selection never draws from nothing.
    pub fn validate(&self) -> Result<(), CatalogError> {
        for d in &self.entries {
            if !(d.rarity.is_finite() && d.rarity > 0.0) {
                return Err(CatalogError::BadWeight { kind: d.kind, rarity: d.rarity });
            }
            if !(d.min_effect.is_finite() && d.max_effect.is_finite() && d.min_effect <= d.max_effect) {
                return Err(CatalogError::BadRange {
                    kind: d.kind,
                    min_effect: d.min_effect,
                    max_effect: d.max_effect,
                });
            }
            if !(d.duration.is_finite() && d.duration > 0.0) {
                return Err(CatalogError::BadDuration { kind: d.kind, duration: d.duration });
            }
        }
        match Tier::ALL.into_iter().find(|&t| self.available_for(t).is_empty()) {
            Some(tier) => Err(CatalogError::EmptyTier(tier)),
            None => Ok(()),
        }
    }
}

/// The built-in catalog.
pub fn default_catalog() -> Catalog {
    use EventKind::*;
    use Tier::*;

    let all = vec![Penny, SmallCap, MidCap, BlueChip];
    let speculative = vec![Penny, SmallCap];
    let established = vec![MidCap, BlueChip];

    let def = |kind, min_effect, max_effect, duration, rarity, tiers: &Vec<Tier>| EventDefinition {
        kind,
        min_effect,
        max_effect,
        duration,
        rarity,
        tiers: tiers.clone(),
    };

    Catalog {
        entries: vec![
            // ── Standard single-phase shocks ────────────────────────────────
            def(EarningsBeat, 0.10, 0.25, 6.0, 1.0, &all),
            def(EarningsMiss, -0.25, -0.10, 6.0, 1.0, &all),
            def(AnalystUpgrade, 0.05, 0.12, 4.0, 1.2, &all),
            def(AnalystDowngrade, -0.12, -0.05, 4.0, 1.2, &all),
            def(Buyback, 0.06, 0.15, 6.0, 0.6, &established),
            def(FlashCrash, -0.35, -0.20, 3.0, 0.3, &all),
            // ── Directional: magnitude in [|min|, max], coin-flip sign ───────
            def(Rumor, -0.04, 0.10, 3.0, 1.5, &all),
            def(SectorRotation, -0.08, 0.18, 8.0, 0.8, &all),
            // ── Rare ─────────────────────────────────────────────────────────
            def(ShortSqueeze, 0.40, 0.80, 5.0, 0.15, &speculative),
            def(MarketCrash, -0.50, -0.30, 8.0, 0.1, &all),
            // ── Two-act ─────────────────────────────────────────────────────
            def(PumpAndDump, 0.40, 0.70, 10.0, 0.2, &vec![Penny]),
            def(CrashAndRecover, -0.30, -0.15, 10.0, 0.25, &all),
        ],
    }
}

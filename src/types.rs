use serde::{Deserialize, Serialize};

/// Identity of a tradeable instrument; used as the key for per-instrument
/// price anchors in the effect ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u64);

/// Stable index of an active event inside the effect ledger's slot arena.
/// Valid until the ledger is cleared at the next round boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub usize);

/// One-based act index. Acts at or beyond the late-act threshold schedule
/// more events per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Act(pub u32);

impl Act {
    pub fn is_late(self, threshold: u32) -> bool {
        self.0 >= threshold
    }
}

/// One-based round index within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundNumber(pub u32);

/// Market-cap tier of the round's instrument. Controls which catalog
/// entries may fire and how many events a round schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Penny,
    SmallCap,
    MidCap,
    BlueChip,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Penny, Tier::SmallCap, Tier::MidCap, Tier::BlueChip];

    /// Multiplier applied to the rolled base event count.
    pub fn event_frequency_modifier(self) -> f64 {
        match self {
            Tier::Penny => 1.5,
            Tier::SmallCap => 1.25,
            Tier::MidCap => 1.0,
            Tier::BlueChip => 0.75,
        }
    }

    pub fn parse(s: &str) -> Option<Tier> {
        match s.to_ascii_lowercase().as_str() {
            "penny" => Some(Tier::Penny),
            "small" | "smallcap" | "small-cap" => Some(Tier::SmallCap),
            "mid" | "midcap" | "mid-cap" => Some(Tier::MidCap),
            "blue" | "bluechip" | "blue-chip" => Some(Tier::BlueChip),
            _ => None,
        }
    }
}

/// Which instruments an active event moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTarget {
    Instrument(InstrumentId),
    /// Market-wide: every instrument queried against the ledger.
    All,
}

impl EventTarget {
    pub fn applies_to(self, id: InstrumentId) -> bool {
        match self {
            EventTarget::Instrument(target) => target == id,
            EventTarget::All => true,
        }
    }
}

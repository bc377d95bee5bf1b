use serde::{Deserialize, Serialize};

use crate::catalog::EventKind;
use crate::scheduler::PlannedEvent;
use crate::types::{Act, EventTarget, RoundNumber, SlotId, Tier};

/// Round lifecycle notifications. Fire-and-forget: producers push them,
/// presentation and logging consume them, nothing acknowledges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoundEvent {
    RoundStarted {
        round: RoundNumber,
        act: Act,
        tier: Tier,
        event_count: usize,
    },
    /// One per resolved plan, emitted right after `RoundStarted`.
    EventPlanned { index: usize, plan: PlannedEvent },
    EventStarted {
        slot: SlotId,
        kind: EventKind,
        target: EventTarget,
        effect: f64,
    },
    EventEnded {
        slot: SlotId,
        kind: EventKind,
        target: EventTarget,
    },
    /// A gameplay hook fired an unplanned event; the matching
    /// `EventStarted` follows.
    ForcedFire { kind: EventKind },
    RoundEnded { terminal_price: f64 },
}

/// Log entry: a notification stamped with round-elapsed seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub elapsed: f64,
    pub event: RoundEvent,
}

/// Notifications in emission order.
pub type EventLog = Vec<LoggedEvent>;

#[cfg(test)]
mod tests {
    use std::io::{BufWriter, Write};

    use super::*;
    use crate::types::InstrumentId;

    #[test]
    fn logged_event_serializes_elapsed_and_event_fields() {
        let ev = LoggedEvent {
            elapsed: 1.5,
            event: RoundEvent::RoundEnded { terminal_price: 12.5 },
        };
        let json = serde_json::to_string(&ev).unwrap();
        assert_eq!(json, r#"{"elapsed":1.5,"event":{"RoundEnded":{"terminal_price":12.5}}}"#);
    }

    #[test]
    fn event_started_json_shape() {
        let ev = LoggedEvent {
            elapsed: 10.0,
            event: RoundEvent::EventStarted {
                slot: SlotId(0),
                kind: EventKind::FlashCrash,
                target: EventTarget::Instrument(InstrumentId(1)),
                effect: -0.25,
            },
        };
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["event"]["EventStarted"]["kind"], "FlashCrash");
        assert_eq!(value["event"]["EventStarted"]["slot"], 0);
        assert_eq!(value["event"]["EventStarted"]["target"]["Instrument"], 1);
    }

    #[test]
    fn ndjson_round_trip_preserves_log() {
        let log: EventLog = vec![
            LoggedEvent {
                elapsed: 0.0,
                event: RoundEvent::RoundStarted {
                    round: RoundNumber(1),
                    act: Act(1),
                    tier: Tier::Penny,
                    event_count: 3,
                },
            },
            LoggedEvent {
                elapsed: 4.0,
                event: RoundEvent::EventEnded {
                    slot: SlotId(2),
                    kind: EventKind::Rumor,
                    target: EventTarget::All,
                },
            },
        ];

        let mut buf: Vec<u8> = Vec::new();
        {
            let mut writer = BufWriter::new(&mut buf);
            for e in &log {
                serde_json::to_writer(&mut writer, e).unwrap();
                writeln!(writer).unwrap();
            }
        }

        let text = String::from_utf8(buf).unwrap();
        let parsed: EventLog = text
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed, log);
    }
}

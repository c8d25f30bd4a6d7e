//! Station news events.
//!
//! Notable transitions are pushed onto the world's [`EventLog`] as they
//! happen. The log serializes to JSON lines for replay and debugging.
//!
//! # Events
//!
//! - `station_created` / `station_deleted`
//! - `accepts_cargo` / `rejects_cargo` - acceptance mask changed
//! - `link_removed` - stale link graph edge dropped
//! - `graphs_merged` - two link graphs joined

use crate::cargo::CargoType;
use crate::link_graph::LinkGraphId;
use crate::state::{Date, StationId};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Uses serde's tag format for JSONL output:
/// ```json
/// {"type":"accepts_cargo","date":"1950.1.3","station":3,"cargos":[0]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StationEvent {
    StationCreated {
        date: String,
        station: StationId,
        name: String,
    },
    StationDeleted {
        date: String,
        station: StationId,
    },
    /// The station started accepting these cargo types.
    AcceptsCargo {
        date: String,
        station: StationId,
        cargos: Vec<CargoType>,
    },
    /// The station no longer accepts these cargo types.
    RejectsCargo {
        date: String,
        station: StationId,
        cargos: Vec<CargoType>,
    },
    LinkRemoved {
        date: String,
        cargo: CargoType,
        from: StationId,
        to: StationId,
    },
    GraphsMerged {
        date: String,
        cargo: CargoType,
        survivor: LinkGraphId,
        merged: LinkGraphId,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<StationEvent>,
}

impl EventLog {
    pub fn push(&mut self, event: StationEvent) {
        log::debug!("news: {:?}", event);
        self.events.push(event);
    }

    pub fn events(&self) -> &[StationEvent] {
        &self.events
    }

    /// Remove and return everything recorded so far.
    pub fn drain(&mut self) -> Vec<StationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Write each event as one JSON line.
    pub fn write_jsonl(&self, writer: &mut dyn Write) -> std::io::Result<()> {
        for event in &self.events {
            serde_json::to_writer(&mut *writer, event)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }
}

pub(crate) fn date_string(date: Date) -> String {
    date.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_jsonl_tagging() {
        let mut log = EventLog::default();
        log.push(StationEvent::AcceptsCargo {
            date: "1950.1.3".to_string(),
            station: StationId(3),
            cargos: vec![CargoType(0)],
        });

        let mut out = Vec::new();
        log.write_jsonl(&mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.starts_with("{\"type\":\"accepts_cargo\""));
        assert!(line.ends_with("}\n"));
    }

    #[test]
    fn test_drain_empties_log() {
        let mut log = EventLog::default();
        log.push(StationEvent::StationDeleted {
            date: "1950.1.1".to_string(),
            station: StationId(1),
        });
        assert_eq!(log.drain().len(), 1);
        assert!(log.events().is_empty());
    }
}

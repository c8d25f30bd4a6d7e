use crate::map::{Axis, DiagDirection, RailType, RoadStopType, RoadType, TileIndex};
use crate::state::{CompanyId, StationId};
use serde::{Deserialize, Serialize};

/// Commands issued by one company for the next tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyInputs {
    pub company: CompanyId,
    pub commands: Vec<Command>,
}

/// A station command. `join` is a station id or [`NEW_STATION`](crate::command::NEW_STATION).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    // Rail
    BuildRailStation {
        tile: TileIndex,
        rail_type: RailType,
        axis: Axis,
        numtracks: u8,
        plat_len: u8,
        join: StationId,
        #[serde(default)]
        adjacent: bool,
    },
    RemoveFromRailStation {
        start: TileIndex,
        end: TileIndex,
        #[serde(default)]
        keep_rail: bool,
    },
    /// Remove the whole rail part of the station at `tile`.
    RemoveRailStation {
        tile: TileIndex,
    },
    BuildRailWaypoint {
        tile: TileIndex,
        axis: Axis,
        join: StationId,
        #[serde(default)]
        adjacent: bool,
    },
    RemoveFromRailWaypoint {
        start: TileIndex,
        end: TileIndex,
        #[serde(default)]
        keep_rail: bool,
    },

    // Road
    BuildRoadStop {
        tile: TileIndex,
        width: u8,
        length: u8,
        stop_type: RoadStopType,
        drive_through: bool,
        /// Entrance of a bay stop; for drive-through stops only its axis counts.
        direction: DiagDirection,
        road_type: RoadType,
        join: StationId,
        #[serde(default)]
        adjacent: bool,
    },
    RemoveRoadStop {
        tile: TileIndex,
        width: u8,
        height: u8,
        stop_type: RoadStopType,
        #[serde(default)]
        remove_road: bool,
    },

    // Air
    BuildAirport {
        tile: TileIndex,
        airport_type: crate::airport::AirportType,
        #[serde(default)]
        layout: u8,
        join: StationId,
        #[serde(default)]
        adjacent: bool,
    },
    RemoveAirport {
        tile: TileIndex,
    },
    OpenCloseAirport {
        station: StationId,
    },

    // Water
    BuildDock {
        tile: TileIndex,
        join: StationId,
        #[serde(default)]
        adjacent: bool,
    },
    RemoveDock {
        tile: TileIndex,
    },

    // Meta
    RenameStation {
        station: StationId,
        name: String,
    },
    /// Generic demolition of whatever station part sits on `tile`.
    ClearTile {
        tile: TileIndex,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_json_shape() {
        let cmd: Command = serde_json::from_str(
            r#"{"command":"remove_from_rail_station","start":{"x":3,"y":4},"end":{"x":3,"y":4}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::RemoveFromRailStation {
                start: TileIndex::new(3, 4),
                end: TileIndex::new(3, 4),
                keep_rail: false,
            }
        );
    }
}

//! Custom station names.

use super::{check_ownership, CommandContext, CommandCost, CommandError, CommandResult, ExpenseType};
use crate::naming::is_unique_station_name;
use crate::state::{StationId, World};

/// Names must be shorter than this many characters.
pub const MAX_LENGTH_STATION_NAME_CHARS: usize = 32;

/// Give `station` a custom name. An empty name restores the generated one.
pub fn rename_station(world: &mut World, ctx: &CommandContext, station: StationId, name: &str) -> CommandResult {
    let owner = world.stations.get(station).map(|st| st.owner).ok_or(CommandError::Invalid)?;
    check_ownership(owner, ctx.company)?;

    let reset = name.is_empty();
    if !reset {
        if name.chars().count() >= MAX_LENGTH_STATION_NAME_CHARS {
            return Err(CommandError::NameTooLong);
        }
        if !is_unique_station_name(world, name, station) {
            return Err(CommandError::NameMustBeUnique);
        }
    }

    if ctx.exec() {
        if let Some(st) = world.stations.get_mut(station) {
            st.name = (!reset).then(|| name.to_string());
            log::debug!("station {} renamed to {:?}", station, st.name);
        }
    }
    Ok(CommandCost::new(ExpenseType::Construction))
}

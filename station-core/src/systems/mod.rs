//! Periodic station systems.

pub mod deletion;
pub mod link_stats;
pub mod rating;
pub mod supply;

pub use deletion::delete_station;
pub use link_stats::{
    delete_stale_links, increase_stats, increase_stats_for_consist, reroute_cargo, run_link_graph_job, Wagon,
};
pub use rating::{update_station_rating, STATION_RATING_TICKS};
pub use supply::{
    modify_station_rating_around, move_goods_to_station, record_delivery, record_pickup, stations_near,
    update_station_waiting,
};

pub mod client;
pub mod csv_frame;
pub mod error;
pub mod locate_station;
pub mod station;

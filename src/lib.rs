pub mod analysis;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod effects;
pub mod events;
pub mod force;
pub mod instrument;
pub mod market_event;
pub mod phases;
pub mod replay;
pub mod scheduler;
pub mod types;

pub mod agents;
pub mod config;
pub mod constants;
pub mod maze;
pub mod rng;
pub mod score_board;
pub mod server_protocol;
pub mod server_utils;
pub mod session;
pub mod targeting;
pub mod timers;
pub mod types;

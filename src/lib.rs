pub mod api;
pub mod blink;
pub mod bus;
pub mod closure;
pub mod config;
pub mod controller;
pub mod detection;
pub mod error;
pub mod fusion;
pub mod gateway;
pub mod led;
pub mod metrics;
pub mod sensor;
pub mod state;
pub mod thresholds;

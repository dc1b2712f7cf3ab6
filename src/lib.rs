pub mod config;
pub mod controller;
pub mod domain;
pub mod logging;
pub mod publisher;
pub mod simulation;
pub mod transport;

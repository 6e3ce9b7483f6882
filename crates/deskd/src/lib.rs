//! deskd - virtual desktop lifecycle daemon.
//!
//! Keeps a fleet of cloud-hosted virtual desktops aligned with their
//! owners' weekly schedules: desktops due to run are started, desktops
//! past their window are stopped once confirmed idle, and desktops left
//! stopped beyond a retention window are torn down for good.

pub mod chunk;
pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod executor;
pub mod fleet;
pub mod idle;
pub mod schedule;
pub mod session;
pub mod sweeper;
pub mod telemetry;

#[cfg(test)]
mod testutil;

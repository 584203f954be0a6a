#![allow(clippy::field_reassign_with_default)]

//! Crate containing quasi-static models for time-stepped energy consumption,
//! battery state of charge, and range estimation of battery electric vehicles
//! # Features:
//! - logging: emit `log` warnings for clamped state of charge and trace misses
//! - bincode: enable the `bin` format in [`traits::SerdeAPI`]

#[macro_use]
pub mod macros;

pub mod battery;
pub mod cycle;
pub mod dynamics;
pub mod error;
pub mod imports;
pub mod params;
pub mod prelude;
pub mod range;
pub mod simdrive;
pub mod traits;
pub mod uncertainty;
pub mod utils;
pub mod validation;

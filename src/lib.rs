#![cfg_attr(not(test), no_std)]

//! mip-balance: balance controller for a two-wheeled mobile inverted pendulum
//!
//! Hardware-independent core shared by the firmware binary and the host
//! tests: the IIR filter engine, the complementary angle estimator, the
//! cascaded D1/D2 loops, and the arm/disarm safety logic.
//!
//! | Module | Purpose |
//! | ------ | ------- |
//! | [`filter`] | Generic difference-equation filter with saturation and soft-start |
//! | [`estimator`] | Complementary body-angle estimator |
//! | [`controller`] | Inner (D1) and outer (D2) loop controllers |
//! | [`safety`] | Arm/disarm decisions, tip-over and stall protection |
//! | [`state`] | Shared state between the two loop contexts |
//! | [`hal`] | Traits the board drivers implement |
//! | [`config`] | Tuning and wiring constants |
//! | [`telemetry`] | Diagnostic console lines |

pub mod logging;

pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod hal;
pub mod safety;
pub mod state;
pub mod telemetry;

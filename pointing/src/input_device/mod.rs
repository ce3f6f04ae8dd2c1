//! Pointing-device drivers.
//!
//! This module defines the [`PointingDriver`] trait shared by all sensor
//! drivers. An external scheduler calls [`PointingDriver::init`] once at
//! device bring-up and then polls [`PointingDriver::get_report`] once per
//! input cycle. Drivers own their session and contact state exclusively and
//! are polled from a single logical thread of control, so no locking is
//! required.

pub mod analog_joystick;
pub mod azoteq_iqs5xx;
pub mod bela_trill;
pub mod maxtouch;

/// Errors of pointing drivers.
///
/// Bus failures are never fatal: polls that hit one log it and return the
/// unchanged or empty report for that cycle, to be retried on the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// Bus transaction failed (timeout or NACK).
    Bus,
    /// A configuration parameter is outside its valid range; rejected before
    /// any bus access.
    InvalidMode,
    /// Device discovery or configuration failed during init.
    InitFailed,
}

/// The trait for pointing-device drivers.
#[allow(async_fn_in_trait)]
pub trait PointingDriver {
    /// The report type this sensor produces, see [`crate::hid`].
    type Report;

    /// Initialize the sensor. Called once; the host may retry on failure.
    async fn init(&mut self) -> Result<(), DriverError>;

    /// Poll the sensor and produce one report. Never fails: a bus error
    /// degrades to an unchanged or empty report for this cycle.
    async fn get_report(&mut self) -> Self::Report;
}

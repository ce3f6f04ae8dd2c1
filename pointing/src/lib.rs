#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! Pointing device and digitizer drivers for keyboard firmware.
//!
//! Each driver owns one physical sensor and exposes the same narrow contract:
//! [`PointingDriver::init`] is called once by the host scheduler, then
//! [`PointingDriver::get_report`] is polled once per input cycle and returns a
//! finished report by value. The host forwards the report unmodified; nothing
//! here blocks past the bus timeout, spawns tasks, or retries within a cycle.
//!
//! Available drivers:
//!
//! - [`input_device::analog_joystick`]: resistive joystick on two ADC channels
//! - [`input_device::azoteq_iqs5xx`]: Azoteq IQS5xx capacitive trackpad
//! - [`input_device::bela_trill`]: Bela Trill 2D capacitive sensor
//! - [`input_device::maxtouch`]: maXTouch multi-touch digitizer

#[macro_use]
mod macros;

pub mod hid;
pub mod input_device;

pub use input_device::{DriverError, PointingDriver};

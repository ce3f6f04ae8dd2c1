//! Analog joystick driver.
//!
//! Two ADC channels are calibrated against an origin sampled once at init and
//! converted into a speed-shaped relative mouse report. Small displacements
//! near the origin produce near-zero output and large displacements saturate
//! at the configured maximum speed.

use embedded_hal::digital::InputPin;
use usbd_hid::descriptor::MouseReport;

use crate::input_device::{DriverError, PointingDriver};

/// Axis selector for an [`AnalogSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AnalogChannel {
    X,
    Y,
}

/// Source of raw analog samples.
///
/// Reads are infallible: an implementation is expected to return its reset
/// value when a conversion fails, so this seam carries no error channel.
#[allow(async_fn_in_trait)]
pub trait AnalogSource {
    async fn read(&mut self, channel: AnalogChannel) -> u16;
}

/// Analog joystick configuration.
#[derive(Debug, Clone)]
pub struct AnalogJoystickConfig {
    /// Raw sample at the low rail of each axis.
    pub axis_min: u16,
    /// Raw sample at the high rail of each axis.
    pub axis_max: u16,
    /// Speed curve divisor; larger values widen the center deadzone.
    pub speed_regulator: u8,
    /// Maximum per-poll delta at full deflection.
    pub speed_max: u8,
}

impl Default for AnalogJoystickConfig {
    fn default() -> Self {
        Self {
            axis_min: 0,
            axis_max: 1023,
            speed_regulator: 20,
            speed_max: 2,
        }
    }
}

/// Analog joystick driver over an [`AnalogSource`] and an optional active-low
/// button pin.
///
/// The per-axis origin is sampled exactly once in [`PointingDriver::init`] and
/// never refreshed, so slow physical drift is not corrected. This is a known
/// limitation carried over from the reference hardware bring-up.
pub struct AnalogJoystick<A: AnalogSource, BTN: InputPin> {
    adc: A,
    button: Option<BTN>,
    config: AnalogJoystickConfig,
    x_origin: u16,
    y_origin: u16,
}

impl<A: AnalogSource, BTN: InputPin> AnalogJoystick<A, BTN> {
    /// Create a new driver. The button pin, if any, must already be
    /// configured as an input with pull-up (the button shorts it to ground).
    pub fn new(adc: A, button: Option<BTN>, config: AnalogJoystickConfig) -> Self {
        Self {
            adc,
            button,
            config,
            x_origin: 0,
            y_origin: 0,
        }
    }

    fn button_pressed(&mut self) -> bool {
        match &mut self.button {
            Some(pin) => pin.is_low().unwrap_or(false),
            None => false,
        }
    }
}

/// Scale a raw sample into a signed percentage coordinate in [-100, 100]
/// relative to the calibrated origin.
fn axis_coordinate(config: &AnalogJoystickConfig, position: u16, origin: u16) -> i16 {
    if origin == position {
        return 0;
    }

    let (distance, range, direction) = if origin > position {
        (origin - position, origin.saturating_sub(config.axis_min), -1i16)
    } else {
        (position - origin, config.axis_max.saturating_sub(origin), 1i16)
    };

    if range == 0 {
        // The rail sits on the origin; any displacement is full deflection.
        return 100 * direction;
    }

    let percent = distance as f32 / range as f32;
    let coordinate = (percent * 100.0) as i16;
    if coordinate > 100 {
        100 * direction
    } else {
        coordinate * direction
    }
}

/// Shape a percentage coordinate into a mouse delta.
///
/// The integer division by `speed_regulator` keeps small displacements pinned
/// to zero, and the result saturates into the i8 report range.
fn axis_delta(config: &AnalogJoystickConfig, position: u16, origin: u16) -> i8 {
    let coordinate = axis_coordinate(config, position, origin);
    if coordinate == 0 {
        return 0;
    }

    let percent = coordinate as f32 / 100.0;
    let shaping = coordinate.unsigned_abs() / config.speed_regulator.max(1) as u16;
    let delta = percent * config.speed_max as f32 * shaping as f32;
    delta.clamp(i8::MIN as f32, i8::MAX as f32) as i8
}

impl<A: AnalogSource, BTN: InputPin> PointingDriver for AnalogJoystick<A, BTN> {
    type Report = MouseReport;

    async fn init(&mut self) -> Result<(), DriverError> {
        // Account for drift between boards: the idle position is the origin.
        self.x_origin = self.adc.read(AnalogChannel::X).await;
        self.y_origin = self.adc.read(AnalogChannel::Y).await;
        info!(
            "Analog joystick origin: x = {}, y = {}",
            self.x_origin, self.y_origin
        );
        Ok(())
    }

    async fn get_report(&mut self) -> MouseReport {
        let x_sample = self.adc.read(AnalogChannel::X).await;
        let y_sample = self.adc.read(AnalogChannel::Y).await;

        let x = axis_delta(&self.config, x_sample, self.x_origin);
        let y = axis_delta(&self.config, y_sample, self.y_origin);
        debug!("Raw ] X: {}, Y: {}", x, y);

        MouseReport {
            buttons: self.button_pressed() as u8,
            x,
            y,
            wheel: 0,
            pan: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::convert::Infallible;

    use embassy_futures::block_on;
    use embedded_hal::digital::ErrorType;

    use super::*;

    // Init logger for tests
    #[ctor::ctor]
    fn init_log() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }

    struct FakeAdc {
        x: u16,
        y: u16,
    }

    impl AnalogSource for FakeAdc {
        async fn read(&mut self, channel: AnalogChannel) -> u16 {
            match channel {
                AnalogChannel::X => self.x,
                AnalogChannel::Y => self.y,
            }
        }
    }

    struct FakeButton {
        low: bool,
    }

    impl ErrorType for FakeButton {
        type Error = Infallible;
    }

    impl InputPin for FakeButton {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.low)
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(self.low)
        }
    }

    fn driver(x: u16, y: u16) -> AnalogJoystick<FakeAdc, FakeButton> {
        AnalogJoystick::new(FakeAdc { x, y }, None, AnalogJoystickConfig::default())
    }

    #[test]
    fn sample_at_origin_is_zero() {
        let mut joystick = driver(512, 512);
        block_on(joystick.init()).unwrap();

        let report = block_on(joystick.get_report());
        assert_eq!(report.x, 0);
        assert_eq!(report.y, 0);
    }

    #[test]
    fn small_displacement_stays_in_deadzone() {
        let mut joystick = driver(512, 512);
        block_on(joystick.init()).unwrap();

        // 4 counts out of a 511 count range is well under one speed_regulator
        // step, so the shaped delta must be zero.
        joystick.adc.x = 516;
        let report = block_on(joystick.get_report());
        assert_eq!(report.x, 0);
    }

    #[test]
    fn full_deflection_saturates_at_speed_max_curve() {
        let mut joystick = driver(512, 512);
        block_on(joystick.init()).unwrap();

        // coordinate = 100, shaping = 100 / 20 = 5, delta = 1.0 * 2 * 5
        joystick.adc.x = 1023;
        joystick.adc.y = 0;
        let report = block_on(joystick.get_report());
        assert_eq!(report.x, 10);
        assert_eq!(report.y, -10);
    }

    #[test]
    fn coordinate_clamps_beyond_the_rails() {
        let config = AnalogJoystickConfig {
            axis_min: 100,
            axis_max: 900,
            ..Default::default()
        };

        // A sample past the configured rail clamps to coordinate 100.
        assert_eq!(axis_coordinate(&config, 1023, 512), 100);
        assert_eq!(axis_coordinate(&config, 0, 512), -100);
    }

    #[test]
    fn delta_saturates_instead_of_wrapping() {
        let config = AnalogJoystickConfig {
            speed_regulator: 1,
            speed_max: 200,
            ..Default::default()
        };
        // coordinate = 100, shaping = 100, raw delta = 200 * 100 = 20000
        assert_eq!(axis_delta(&config, 1023, 512), i8::MAX);
        assert_eq!(axis_delta(&config, 0, 512), i8::MIN);
    }

    #[test]
    fn button_is_active_low() {
        let mut joystick = AnalogJoystick::new(
            FakeAdc { x: 512, y: 512 },
            Some(FakeButton { low: true }),
            AnalogJoystickConfig::default(),
        );
        block_on(joystick.init()).unwrap();

        let report = block_on(joystick.get_report());
        assert_eq!(report.buttons, 1);

        joystick.button = Some(FakeButton { low: false });
        let report = block_on(joystick.get_report());
        assert_eq!(report.buttons, 0);
    }
}

//! Azoteq IQS5xx trackpad driver.
//!
//! The controller exposes a 16-bit big-endian register map and requires every
//! communication session to be closed by a write to the END_COMMS register;
//! without it the device stays in its streaming window and subsequent reads
//! stall. Gesture recognition (tap, two-finger tap, scroll) runs on-chip, so
//! polling only decodes the base data block into a relative mouse report.

use embedded_hal_async::i2c::I2c;
use usbd_hid::descriptor::MouseReport;

use crate::hid::{BUTTON_1, BUTTON_2};
use crate::input_device::{DriverError, PointingDriver};

pub const AZOTEQ_IQS5XX_ADDRESS: u8 = 0x74;

// ============================================================================
// Register map (16-bit addresses, transmitted big-endian)
// ============================================================================
const REG_PREVIOUS_CYCLE_TIME: u16 = 0x000C;
const REG_REPORT_RATE_ACTIVE: u16 = 0x057A;
const REG_SYSTEM_CONFIG_1: u16 = 0x058F;
const REG_SINGLE_FINGER_GESTURES: u16 = 0x06B7;
const REG_END_COMMS: u16 = 0xEEEE;

// Any value written to END_COMMS closes the session.
const END_COMMS_BYTE: u8 = 1;

// ============================================================================
// SYSTEM_CONFIG_1 bits
// ============================================================================
const SYS_CFG1_EVENT_MODE: u8 = 1 << 0;
const SYS_CFG1_TP_EVENT: u8 = 1 << 2;
const SYS_CFG1_TOUCH_EVENT: u8 = 1 << 6;

// ============================================================================
// Gesture event bits (base data bytes 1 and 2)
// ============================================================================
const GESTURE_EVENTS_0_SINGLE_TAP: u8 = 1 << 0;
const GESTURE_EVENTS_0_PRESS_AND_HOLD: u8 = 1 << 1;
const GESTURE_EVENTS_1_TWO_FINGER_TAP: u8 = 1 << 0;
const GESTURE_EVENTS_1_SCROLL: u8 = 1 << 1;

// Gesture enable bits in the gesture configuration block.
const SINGLE_FINGER_SINGLE_TAP: u8 = 1 << 0;
const MULTI_FINGER_TWO_FINGER_TAP: u8 = 1 << 0;
const MULTI_FINGER_SCROLL: u8 = 1 << 1;

const WRITE_BUF_LEN: usize = 32;

/// Charging (power) modes with individually configurable report rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChargingMode {
    Active = 0,
    IdleTouch = 1,
    Idle = 2,
    Lp1 = 3,
    Lp2 = 4,
}

impl ChargingMode {
    /// Report rate registers are laid out contiguously, one u16 per mode.
    fn report_rate_register(self) -> u16 {
        REG_REPORT_RATE_ACTIVE + 2 * self as u16
    }
}

impl TryFrom<u8> for ChargingMode {
    type Error = DriverError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Active),
            1 => Ok(Self::IdleTouch),
            2 => Ok(Self::Idle),
            3 => Ok(Self::Lp1),
            4 => Ok(Self::Lp2),
            _ => Err(DriverError::InvalidMode),
        }
    }
}

/// Base data block read once per poll, starting at PREVIOUS_CYCLE_TIME.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaseData {
    pub previous_cycle_time: u8,
    pub gesture_events_0: u8,
    pub gesture_events_1: u8,
    pub system_info_0: u8,
    pub system_info_1: u8,
    pub number_of_fingers: u8,
    pub relative_x: i16,
    pub relative_y: i16,
}

impl BaseData {
    pub const LEN: usize = 10;

    fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        Self {
            previous_cycle_time: bytes[0],
            gesture_events_0: bytes[1],
            gesture_events_1: bytes[2],
            system_info_0: bytes[3],
            system_info_1: bytes[4],
            number_of_fingers: bytes[5],
            relative_x: i16::from_be_bytes([bytes[6], bytes[7]]),
            relative_y: i16::from_be_bytes([bytes[8], bytes[9]]),
        }
    }
}

/// Gesture configuration block at SINGLE_FINGER_GESTURES; u16 fields are
/// big-endian on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GestureConfig {
    pub single_finger_gestures: u8,
    pub multi_finger_gestures: u8,
    pub tap_time: u16,
    pub tap_distance: u16,
    pub hold_time: u16,
    pub swipe_initial_time: u16,
    pub swipe_initial_distance: u16,
    pub swipe_consecutive_time: u16,
    pub swipe_consecutive_distance: u16,
    pub swipe_angle: u8,
    pub scroll_initial_distance: u16,
    pub zoom_initial_distance: u16,
    pub zoom_consecutive_distance: u16,
}

impl GestureConfig {
    pub const LEN: usize = 23;

    fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        let u16_at = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        Self {
            single_finger_gestures: bytes[0],
            multi_finger_gestures: bytes[1],
            tap_time: u16_at(2),
            tap_distance: u16_at(4),
            hold_time: u16_at(6),
            swipe_initial_time: u16_at(8),
            swipe_initial_distance: u16_at(10),
            swipe_consecutive_time: u16_at(12),
            swipe_consecutive_distance: u16_at(14),
            swipe_angle: bytes[16],
            scroll_initial_distance: u16_at(17),
            zoom_initial_distance: u16_at(19),
            zoom_consecutive_distance: u16_at(21),
        }
    }

    fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0u8; Self::LEN];
        bytes[0] = self.single_finger_gestures;
        bytes[1] = self.multi_finger_gestures;
        bytes[2..4].copy_from_slice(&self.tap_time.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.tap_distance.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.hold_time.to_be_bytes());
        bytes[8..10].copy_from_slice(&self.swipe_initial_time.to_be_bytes());
        bytes[10..12].copy_from_slice(&self.swipe_initial_distance.to_be_bytes());
        bytes[12..14].copy_from_slice(&self.swipe_consecutive_time.to_be_bytes());
        bytes[14..16].copy_from_slice(&self.swipe_consecutive_distance.to_be_bytes());
        bytes[16] = self.swipe_angle;
        bytes[17..19].copy_from_slice(&self.scroll_initial_distance.to_be_bytes());
        bytes[19..21].copy_from_slice(&self.zoom_initial_distance.to_be_bytes());
        bytes[21..23].copy_from_slice(&self.zoom_consecutive_distance.to_be_bytes());
        bytes
    }
}

/// IQS5xx configuration.
#[derive(Debug, Clone)]
pub struct Iqs5xxConfig {
    /// 7-bit I2C address.
    pub address: u8,
    /// ACTIVE mode report rate in milliseconds, pushed at init.
    pub report_rate_ms: u16,
    /// Tap gesture time window in milliseconds.
    pub tap_time_ms: u16,
    /// Maximum travel for a touch to still count as a tap.
    pub tap_distance: u16,
    /// Travel before a two-finger scroll starts.
    pub scroll_initial_distance: u16,
}

impl Default for Iqs5xxConfig {
    fn default() -> Self {
        Self {
            address: AZOTEQ_IQS5XX_ADDRESS,
            report_rate_ms: 5,
            tap_time_ms: 500,
            tap_distance: 100,
            scroll_initial_distance: 5,
        }
    }
}

/// Azoteq IQS5xx driver using the embedded-hal async I2C trait.
pub struct Iqs5xx<I2C: I2c> {
    i2c: I2C,
    config: Iqs5xxConfig,
}

impl<I2C: I2c> Iqs5xx<I2C> {
    pub fn new(i2c: I2C, config: Iqs5xxConfig) -> Self {
        Self { i2c, config }
    }

    async fn read_reg(&mut self, register: u16, buf: &mut [u8]) -> Result<(), DriverError> {
        self.i2c
            .write_read(self.config.address, &register.to_be_bytes(), buf)
            .await
            .map_err(|_| DriverError::Bus)
    }

    async fn write_reg(&mut self, register: u16, data: &[u8]) -> Result<(), DriverError> {
        debug_assert!(data.len() <= WRITE_BUF_LEN - 2);
        let mut buf = [0u8; WRITE_BUF_LEN];
        buf[..2].copy_from_slice(&register.to_be_bytes());
        buf[2..2 + data.len()].copy_from_slice(data);
        self.i2c
            .write(self.config.address, &buf[..2 + data.len()])
            .await
            .map_err(|_| DriverError::Bus)
    }

    /// Close the communication session. Unconditional after every operation,
    /// even a failed one, or the controller stays locked in streaming mode.
    async fn end_session(&mut self) {
        if self.write_reg(REG_END_COMMS, &[END_COMMS_BYTE]).await.is_err() {
            warn!("IQS5XX - end session write failed");
        }
    }

    /// Read the per-poll base data block.
    pub async fn get_base_data(&mut self) -> Result<BaseData, DriverError> {
        let mut buf = [0u8; BaseData::LEN];
        let status = self.read_reg(REG_PREVIOUS_CYCLE_TIME, &mut buf).await;
        self.end_session().await;
        status.map(|()| BaseData::from_bytes(&buf))
    }

    /// Get the report rate in milliseconds for one charging mode.
    pub async fn get_report_rate(&mut self, mode: ChargingMode) -> Result<u16, DriverError> {
        let mut buf = [0u8; 2];
        let status = self.read_reg(mode.report_rate_register(), &mut buf).await;
        self.end_session().await;
        status.map(|()| u16::from_be_bytes(buf))
    }

    /// Set the report rate in milliseconds for one charging mode.
    pub async fn set_report_rate(
        &mut self,
        rate_ms: u16,
        mode: ChargingMode,
    ) -> Result<(), DriverError> {
        let status = self
            .write_reg(mode.report_rate_register(), &rate_ms.to_be_bytes())
            .await;
        self.end_session().await;
        status
    }

    /// Switch the controller between event-driven and streaming reporting via
    /// read-modify-write of SYSTEM_CONFIG_1. Skips the write-back if the read
    /// failed, but still ends the session.
    pub async fn set_event_mode(&mut self, enabled: bool) -> Result<(), DriverError> {
        let mut buf = [0u8; 1];
        let mut status = self.read_reg(REG_SYSTEM_CONFIG_1, &mut buf).await;
        if status.is_ok() {
            let bits = SYS_CFG1_EVENT_MODE | SYS_CFG1_TP_EVENT | SYS_CFG1_TOUCH_EVENT;
            if enabled {
                buf[0] |= bits;
            } else {
                buf[0] &= !bits;
            }
            status = self.write_reg(REG_SYSTEM_CONFIG_1, &buf).await;
        }
        self.end_session().await;
        status
    }

    /// Enable on-chip tap, two-finger tap and scroll recognition and push the
    /// configured thresholds, read-modify-write like `set_event_mode`.
    pub async fn configure_gestures(&mut self) -> Result<(), DriverError> {
        let mut buf = [0u8; GestureConfig::LEN];
        let mut status = self.read_reg(REG_SINGLE_FINGER_GESTURES, &mut buf).await;
        if status.is_ok() {
            let mut gestures = GestureConfig::from_bytes(&buf);
            gestures.single_finger_gestures |= SINGLE_FINGER_SINGLE_TAP;
            gestures.multi_finger_gestures |= MULTI_FINGER_TWO_FINGER_TAP | MULTI_FINGER_SCROLL;
            gestures.tap_time = self.config.tap_time_ms;
            gestures.tap_distance = self.config.tap_distance;
            gestures.scroll_initial_distance = self.config.scroll_initial_distance;
            status = self
                .write_reg(REG_SINGLE_FINGER_GESTURES, &gestures.to_bytes())
                .await;
        }
        self.end_session().await;
        status
    }

    fn clamp_xy(value: i16) -> i8 {
        value.clamp(i8::MIN as i16, i8::MAX as i16) as i8
    }
}

impl<I2C: I2c> PointingDriver for Iqs5xx<I2C> {
    type Report = MouseReport;

    async fn init(&mut self) -> Result<(), DriverError> {
        self.set_report_rate(self.config.report_rate_ms, ChargingMode::Active)
            .await?;
        self.set_event_mode(true).await?;
        self.configure_gestures().await?;
        info!("IQS5XX initialized");
        Ok(())
    }

    async fn get_report(&mut self) -> MouseReport {
        let mut report = MouseReport {
            buttons: 0,
            x: 0,
            y: 0,
            wheel: 0,
            pan: 0,
        };

        match self.get_base_data().await {
            Ok(base) => {
                if base.gesture_events_0 & GESTURE_EVENTS_0_SINGLE_TAP != 0 {
                    report.buttons |= BUTTON_1;
                }
                if base.gesture_events_0 & GESTURE_EVENTS_0_PRESS_AND_HOLD != 0 {
                    report.buttons |= BUTTON_1;
                }
                if base.gesture_events_1 & GESTURE_EVENTS_1_TWO_FINGER_TAP != 0 {
                    report.buttons |= BUTTON_2;
                }
                if base.gesture_events_1 & GESTURE_EVENTS_1_SCROLL != 0 {
                    report.wheel = Self::clamp_xy(base.relative_x);
                } else if base.number_of_fingers != 0 {
                    report.x = Self::clamp_xy(base.relative_x);
                    report.y = Self::clamp_xy(base.relative_y);
                }
            }
            Err(_) => debug!("IQS5XX - base data read failed, skipping cycle"),
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock, Transaction};

    use super::*;

    fn end_comms() -> Transaction {
        Transaction::write(AZOTEQ_IQS5XX_ADDRESS, vec![0xEE, 0xEE, END_COMMS_BYTE])
    }

    #[test]
    fn invalid_mode_is_rejected_without_bus_access() {
        assert_eq!(ChargingMode::try_from(5), Err(DriverError::InvalidMode));
        assert_eq!(ChargingMode::try_from(2), Ok(ChargingMode::Idle));
    }

    #[test]
    fn set_report_rate_targets_the_mode_register() {
        let expectations = [
            // REPORT_RATE_ACTIVE + 2 * Idle = 0x057E, rate big-endian
            Transaction::write(AZOTEQ_IQS5XX_ADDRESS, vec![0x05, 0x7E, 0x01, 0x2C]),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        block_on(trackpad.set_report_rate(300, ChargingMode::Idle)).unwrap();
        i2c.done();
    }

    #[test]
    fn failed_read_still_ends_the_session() {
        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x05, 0x7A], vec![0x00, 0x00])
                .with_error(ErrorKind::Other),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        let result = block_on(trackpad.get_report_rate(ChargingMode::Active));
        assert_eq!(result, Err(DriverError::Bus));
        i2c.done();
    }

    #[test]
    fn event_mode_skips_write_back_when_read_fails() {
        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x05, 0x8F], vec![0x00])
                .with_error(ErrorKind::Other),
            // No config write-back, only the unconditional end of session.
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        let result = block_on(trackpad.set_event_mode(true));
        assert_eq!(result, Err(DriverError::Bus));
        i2c.done();
    }

    #[test]
    fn event_mode_sets_the_three_mode_bits() {
        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x05, 0x8F], vec![0b1000_0000]),
            Transaction::write(
                AZOTEQ_IQS5XX_ADDRESS,
                vec![0x05, 0x8F, 0b1000_0000 | 0b0100_0101],
            ),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        block_on(trackpad.set_event_mode(true)).unwrap();
        i2c.done();
    }

    #[test]
    fn gesture_config_round_trips_big_endian_fields() {
        let config = GestureConfig {
            single_finger_gestures: SINGLE_FINGER_SINGLE_TAP,
            multi_finger_gestures: MULTI_FINGER_SCROLL,
            tap_time: 500,
            tap_distance: 100,
            scroll_initial_distance: 5,
            ..Default::default()
        };
        let bytes = config.to_bytes();

        assert_eq!(bytes[0], SINGLE_FINGER_SINGLE_TAP);
        assert_eq!(bytes[2..4], [0x01, 0xF4]); // 500 big-endian
        assert_eq!(bytes[4..6], [0x00, 0x64]);
        assert_eq!(bytes[17..19], [0x00, 0x05]);
        assert_eq!(GestureConfig::from_bytes(&bytes), config);
    }

    #[test]
    fn motion_report_decodes_relative_deltas() {
        let mut base = vec![0u8; BaseData::LEN];
        base[5] = 1; // one finger
        base[6..8].copy_from_slice(&5i16.to_be_bytes());
        base[8..10].copy_from_slice(&(-3i16).to_be_bytes());

        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x00, 0x0C], base),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        let report = block_on(trackpad.get_report());
        assert_eq!(report.x, 5);
        assert_eq!(report.y, -3);
        assert_eq!(report.buttons, 0);
        i2c.done();
    }

    #[test]
    fn scroll_gesture_maps_to_wheel() {
        let mut base = vec![0u8; BaseData::LEN];
        base[2] = GESTURE_EVENTS_1_SCROLL;
        base[5] = 2;
        base[6..8].copy_from_slice(&300i16.to_be_bytes());

        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x00, 0x0C], base),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        let report = block_on(trackpad.get_report());
        // Scroll deltas saturate into the i8 report range instead of wrapping.
        assert_eq!(report.wheel, i8::MAX);
        assert_eq!(report.x, 0);
        i2c.done();
    }

    #[test]
    fn tap_gestures_set_button_bits() {
        let mut base = vec![0u8; BaseData::LEN];
        base[1] = GESTURE_EVENTS_0_SINGLE_TAP;

        let expectations = [
            Transaction::write_read(AZOTEQ_IQS5XX_ADDRESS, vec![0x00, 0x0C], base),
            end_comms(),
        ];
        let mut i2c = Mock::new(&expectations);
        let mut trackpad = Iqs5xx::new(i2c.clone(), Iqs5xxConfig::default());

        let report = block_on(trackpad.get_report());
        assert_eq!(report.buttons, BUTTON_1);
        i2c.done();
    }
}

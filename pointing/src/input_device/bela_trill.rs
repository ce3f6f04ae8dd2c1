//! Bela Trill 2D capacitive sensor driver.
//!
//! The sensor reports raw touch centroids per axis; all gesture semantics
//! (tap, tap-then-hold drag, two-finger scroll) live in the host-side contact
//! state machine here. Frames carry a rolling identifier so a frame the
//! sensor has not refreshed since the last poll can be skipped without
//! disturbing contact state.

use embassy_time::{Duration, Instant};
use embedded_hal_async::i2c::I2c;
use usbd_hid::descriptor::MouseReport;

use crate::hid::BUTTON_1;
use crate::input_device::{DriverError, PointingDriver};

pub const BELA_TRILL_ADDRESS: u8 = 0x40;

// 8-bit register map.
const REG_CMD: u8 = 0x00;
const REG_STATUS: u8 = 0x03;

// Command register opcodes.
const CMD_SET_MODE: u8 = 0x01;
const CMD_UPDATE_BASELINE: u8 = 0x06;
const MODE_CENTROID: u8 = 0x00;

const FRAME_ID_MASK: u8 = 0x3F;
const LOCATION_NONE: u16 = 0xFFFF;
const MAX_TOUCHES: usize = 4;

/// One centroid: location along the axis plus an activation size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Centroid {
    pub location: u16,
    pub size: u16,
}

impl Centroid {
    const NONE: Self = Self {
        location: LOCATION_NONE,
        size: 0,
    };

    fn present(&self) -> bool {
        self.location != LOCATION_NONE
    }
}

/// One raw sensor frame: a status byte followed by four vertical and four
/// horizontal centroids, all u16 fields big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CentroidFrame {
    pub frame_id: u8,
    pub vertical: [Centroid; MAX_TOUCHES],
    pub horizontal: [Centroid; MAX_TOUCHES],
}

impl CentroidFrame {
    pub const LEN: usize = 33;

    pub fn from_bytes(bytes: &[u8; Self::LEN]) -> Self {
        let centroid = |offset: usize| Centroid {
            location: u16::from_be_bytes([bytes[offset], bytes[offset + 1]]),
            size: u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]),
        };
        let mut vertical = [Centroid::NONE; MAX_TOUCHES];
        let mut horizontal = [Centroid::NONE; MAX_TOUCHES];
        for i in 0..MAX_TOUCHES {
            vertical[i] = centroid(1 + 4 * i);
            horizontal[i] = centroid(17 + 4 * i);
        }
        Self {
            frame_id: bytes[0] & FRAME_ID_MASK,
            vertical,
            horizontal,
        }
    }

    fn axis_count(axis: &[Centroid; MAX_TOUCHES]) -> u8 {
        axis.iter().take_while(|c| c.present()).count() as u8
    }

    /// Finger count for the frame. The two axes are sampled independently,
    /// so a contact only counts once both axes have localized it.
    pub fn touch_count(&self) -> u8 {
        let v = Self::axis_count(&self.vertical);
        let h = Self::axis_count(&self.horizontal);
        if v == 0 || h == 0 { 0 } else { v.max(h) }
    }
}

/// Bela Trill configuration.
#[derive(Debug, Clone)]
pub struct BelaTrillConfig {
    /// 7-bit I2C address.
    pub address: u8,
    /// Maximum touch duration that still registers as a tap, and the window
    /// after a release in which a new touch becomes a drag.
    pub tap_time: Duration,
    /// Combined activation size below which a frame is ignored as noise.
    pub min_touch_size: u16,
    /// Accumulated single-axis travel per emitted scroll tick.
    pub scroll_divisor: i16,
}

impl Default for BelaTrillConfig {
    fn default() -> Self {
        Self {
            address: BELA_TRILL_ADDRESS,
            tap_time: Duration::from_millis(200),
            min_touch_size: 100,
            scroll_divisor: 4,
        }
    }
}

/// Internal relative report, converted to [`MouseReport`] on return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RelReport {
    x: i8,
    y: i8,
    v: i8,
    h: i8,
    buttons: u8,
}

impl RelReport {
    fn into_mouse_report(self) -> MouseReport {
        MouseReport {
            buttons: self.buttons,
            x: self.x,
            y: self.y,
            wheel: self.v,
            pan: self.h,
        }
    }
}

/// Bela Trill driver with host-side contact tracking.
pub struct BelaTrill<I2C: I2c> {
    i2c: I2C,
    config: BelaTrillConfig,
    contact: bool,
    hold: bool,
    last_x: u16,
    last_y: u16,
    last_size: u16,
    last_frame: Option<u8>,
    touch_started: Instant,
    last_release: Option<Instant>,
    scroll_acc_v: i16,
    scroll_acc_h: i16,
    last_report: RelReport,
}

impl<I2C: I2c> BelaTrill<I2C> {
    pub fn new(i2c: I2C, config: BelaTrillConfig) -> Self {
        Self {
            i2c,
            config,
            contact: false,
            hold: false,
            last_x: LOCATION_NONE,
            last_y: LOCATION_NONE,
            last_size: 0,
            last_frame: None,
            touch_started: Instant::from_ticks(0),
            last_release: None,
            scroll_acc_v: 0,
            scroll_acc_h: 0,
            last_report: RelReport::default(),
        }
    }

    async fn write_cmd(&mut self, cmd: u8, arg0: u8) -> Result<(), DriverError> {
        self.i2c
            .write(self.config.address, &[REG_CMD, cmd, arg0])
            .await
            .map_err(|_| DriverError::Bus)
    }

    fn clamp_delta(delta: i32) -> i8 {
        delta.clamp(i8::MIN as i32, i8::MAX as i32) as i8
    }

    /// Advance the contact state machine by one frame.
    fn process_frame(&mut self, frame: CentroidFrame, now: Instant) -> RelReport {
        // A frame id the sensor has not advanced means stale data.
        if self.last_frame == Some(frame.frame_id) {
            return self.last_report;
        }
        self.last_frame = Some(frame.frame_id);

        let mut report = RelReport::default();
        let fingers = frame.touch_count();

        if fingers == 0 {
            if self.contact {
                self.on_liftoff(now, &mut report);
            }
        } else {
            if !self.contact {
                self.on_touchdown(now);
            }
            self.on_active(frame, fingers, &mut report);
        }

        if self.hold {
            report.buttons |= BUTTON_1;
        }
        self.last_report = report;
        report
    }

    fn on_touchdown(&mut self, now: Instant) {
        self.contact = true;
        self.touch_started = now;
        // A touch shortly after a release continues as a drag.
        self.hold = self
            .last_release
            .map(|released| now - released < self.config.tap_time)
            .unwrap_or(false);
    }

    fn on_active(&mut self, frame: CentroidFrame, fingers: u8, report: &mut RelReport) {
        let x = frame.horizontal[0].location;
        let y = frame.vertical[0].location;
        let size = frame.horizontal[0]
            .size
            .saturating_add(frame.vertical[0].size);

        // Reject weak activations and sudden size jumps, both typical of a
        // contact in the middle of forming or lifting.
        let stable = size > self.config.min_touch_size
            && (self.last_size == 0 || size.abs_diff(self.last_size) <= self.last_size / 4);

        if stable && self.last_x != LOCATION_NONE {
            if fingers == 1 {
                // Screen y grows downward, sensor vertical grows upward.
                report.x = Self::clamp_delta(x as i32 - self.last_x as i32);
                report.y = Self::clamp_delta(self.last_y as i32 - y as i32);
            } else {
                self.scroll_acc_v = self
                    .scroll_acc_v
                    .saturating_add((y as i32 - self.last_y as i32) as i16);
                self.scroll_acc_h = self
                    .scroll_acc_h
                    .saturating_add((x as i32 - self.last_x as i32) as i16);
                let div = self.config.scroll_divisor.max(1);
                let v_ticks = self.scroll_acc_v / div;
                let h_ticks = self.scroll_acc_h / div;
                // Keep the remainder so slow scrolls still make progress.
                self.scroll_acc_v -= v_ticks * div;
                self.scroll_acc_h -= h_ticks * div;
                report.v = Self::clamp_delta(v_ticks as i32);
                report.h = Self::clamp_delta(h_ticks as i32);
            }
        }

        self.last_x = x;
        self.last_y = y;
        self.last_size = size;
    }

    fn on_liftoff(&mut self, now: Instant, report: &mut RelReport) {
        self.contact = false;
        self.last_x = LOCATION_NONE;
        self.last_y = LOCATION_NONE;
        self.last_size = 0;
        self.scroll_acc_v = 0;
        self.scroll_acc_h = 0;

        if !self.hold && now - self.touch_started < self.config.tap_time {
            // The tap click lives in exactly one report; the next frame
            // releases it.
            report.buttons |= BUTTON_1;
        }
        self.hold = false;
        self.last_release = Some(now);
    }
}

impl<I2C: I2c> PointingDriver for BelaTrill<I2C> {
    type Report = MouseReport;

    async fn init(&mut self) -> Result<(), DriverError> {
        self.write_cmd(CMD_SET_MODE, MODE_CENTROID).await?;
        self.write_cmd(CMD_UPDATE_BASELINE, 0).await?;
        info!("Bela Trill initialized in centroid mode");
        Ok(())
    }

    async fn get_report(&mut self) -> MouseReport {
        let mut buf = [0u8; CentroidFrame::LEN];
        match self
            .i2c
            .write_read(self.config.address, &[REG_STATUS], &mut buf)
            .await
        {
            Ok(()) => {
                let frame = CentroidFrame::from_bytes(&buf);
                self.process_frame(frame, Instant::now()).into_mouse_report()
            }
            Err(_) => {
                debug!("Bela Trill - frame read failed, repeating last report");
                self.last_report.into_mouse_report()
            }
        }
    }
}

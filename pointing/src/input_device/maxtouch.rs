//! Microchip maXTouch digitizer driver.
//!
//! The controller publishes no fixed register map. Instead an information
//! block at address zero describes an object table, and every runtime address
//! (message processor, power config, touch screen) is discovered from that
//! table at init. Touch events arrive as messages through the T5 object and
//! are demultiplexed by report id into per-finger digitizer slots.
//!
//! Register addresses are 16-bit and transmitted LSB first, unlike the other
//! I2C sensors in this crate.

use embedded_hal_async::i2c::I2c;
use heapless::Vec;

use crate::hid::{DigitizerReport, FingerSlot};
use crate::input_device::{DriverError, PointingDriver};

pub const MXT336UD_ADDRESS: u8 = 0x4A;

const INFORMATION_BLOCK_ADDRESS: u16 = 0x0000;
const INFORMATION_BLOCK_LEN: usize = 7;
const OBJECT_TABLE_START: u16 = 0x0007;
const OBJECT_TABLE_ELEMENT_LEN: usize = 6;
const MAX_OBJECTS: usize = 32;

// T5 message: report id byte plus five data bytes.
const MESSAGE_LEN: usize = 6;

// Object types this driver uses.
const TYPE_MESSAGE_PROCESSOR_T5: u8 = 5;
const TYPE_POWER_CONFIG_T7: u8 = 7;
const TYPE_ACQUISITION_CONFIG_T8: u8 = 8;
const TYPE_MESSAGE_COUNT_T44: u8 = 44;
const TYPE_CTE_CONFIG_T46: u8 = 46;
const TYPE_MULTIPLE_TOUCH_T100: u8 = 100;

// T7 power config.
const T7_IDLE_ACQ_INTERVAL_MS: u8 = 32;
const T7_ACTIVE_ACQ_INTERVAL_MS: u8 = 10;
const T7_ACTIVE_TO_IDLE_TIMEOUT: u8 = 50;
const T7_CFG_IDLEPIPEEN: u8 = 1 << 0;
const T7_CFG_ACTVPIPEEN: u8 = 1 << 1;

// T8 acquisition config offsets.
const T8_CONFIG_LEN: usize = 10;
const T8_TCHAUTOCAL: usize = 4;
const T8_ATCHCALST: usize = 6;
const T8_ATCHCALSTHR: usize = 7;
const T8_ATCHFRCCALTHR: usize = 8;
const T8_ATCHFRCCALRATIO: usize = 9;

const T46_CONFIG_LEN: usize = 10;

// T100 touch screen config offsets.
const T100_CONFIG_LEN: usize = 49;
const T100_CTRL: usize = 0;
const T100_CFG1: usize = 1;
const T100_SCRAUX: usize = 2;
const T100_NUMTCH: usize = 6;
const T100_XSIZE: usize = 9;
const T100_XPITCH: usize = 10;
const T100_XRANGE: usize = 13;
const T100_YSIZE: usize = 20;
const T100_YPITCH: usize = 21;
const T100_YRANGE: usize = 24;
const T100_GAIN: usize = 28;
const T100_DXGAIN: usize = 29;
const T100_TCHTHR: usize = 30;
const T100_MRGTHR: usize = 35;
const T100_MRGHYST: usize = 37;
const T100_TCHDIDOWN: usize = 39;
const T100_TCHDIUP: usize = 40;
const T100_MOVFILTER: usize = 44;
const T100_MOVSMOOTH: usize = 45;
const T100_MOVHYSTI: usize = 47;
const T100_MOVHYSTN: usize = 48;

const T100_CTRL_ENABLE: u8 = 1 << 0;
const T100_CTRL_RPTEN: u8 = 1 << 1;
const T100_CFG1_SWITCHXY: u8 = 1 << 5;
const T100_CFG1_INVERTY: u8 = 1 << 6;
const T100_SCRAUX_NUMRPT: u8 = 1 << 0;

// T100 event codes, low nibble of the first message data byte.
const EVENT_MOVE: u8 = 1;
const EVENT_UNSUP: u8 = 2;
const EVENT_SUP: u8 = 3;
const EVENT_DOWN: u8 = 4;
const EVENT_UP: u8 = 5;
const EVENT_DOWNSUP: u8 = 8;
const EVENT_DOWNUP: u8 = 9;

// The first two T100 report ids carry screen status, finger slots follow.
const T100_FINGER_ID_OFFSET: u8 = 2;

/// One entry of the discovered object table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ObjectTableRecord {
    pub object_type: u8,
    pub address: u16,
    pub size: u8,
    pub instances: u8,
    pub report_ids_per_instance: u8,
}

impl ObjectTableRecord {
    fn from_bytes(bytes: &[u8; OBJECT_TABLE_ELEMENT_LEN]) -> Self {
        Self {
            object_type: bytes[0],
            address: u16::from_le_bytes([bytes[1], bytes[2]]),
            // Size and instance counts are stored minus one.
            size: bytes[3].wrapping_add(1),
            instances: bytes[4].wrapping_add(1),
            report_ids_per_instance: bytes[5],
        }
    }
}

/// Discovered addresses of the objects this driver talks to. Zero means the
/// device does not expose the object.
#[derive(Debug, Clone, Copy, Default)]
struct ObjectAddresses {
    t5: u16,
    t7: u16,
    t8: u16,
    t44: u16,
    t46: u16,
    t100: u16,
    t100_first_report_id: u8,
}

/// Tracking surface material, selecting sensing gain and touch threshold
/// tuned for the overlay thickness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SurfaceType {
    Vinyl,
    Acrylic,
}

impl SurfaceType {
    fn touch_threshold(self) -> u8 {
        match self {
            Self::Vinyl => 18,
            Self::Acrylic => 12,
        }
    }

    fn gain(self) -> u8 {
        match self {
            Self::Vinyl => 4,
            Self::Acrylic => 5,
        }
    }
}

/// maXTouch configuration.
#[derive(Debug, Clone)]
pub struct MaxtouchConfig {
    /// 7-bit I2C address.
    pub address: u8,
    /// Counts reported per inch of travel.
    pub cpi: u16,
    pub sensor_width_mm: u16,
    pub sensor_height_mm: u16,
    /// Matrix dimensions; `None` uses the sizes from the information block.
    pub matrix_x_size: Option<u8>,
    pub matrix_y_size: Option<u8>,
    pub surface: SurfaceType,
    /// Overrides for the surface presets.
    pub touch_threshold: Option<u8>,
    pub gain: Option<u8>,
    pub dx_gain: u8,
    pub switch_xy: bool,
    pub invert_y: bool,
    /// Anti-touch recalibration delay, in cycles.
    pub recalibrate_after: u8,
}

impl Default for MaxtouchConfig {
    fn default() -> Self {
        Self {
            address: MXT336UD_ADDRESS,
            cpi: 600,
            sensor_width_mm: 156,
            sensor_height_mm: 91,
            matrix_x_size: None,
            matrix_y_size: None,
            surface: SurfaceType::Vinyl,
            touch_threshold: None,
            gain: None,
            dx_gain: 255,
            switch_xy: true,
            invert_y: false,
            recalibrate_after: 25,
        }
    }
}

/// Convert a resolution in counts per inch into the sensor sample range for
/// one physical dimension, rounding to the nearest count.
fn cpi_to_samples(cpi: u16, dimension_mm: u16) -> u16 {
    ((cpi as u32 * dimension_mm as u32 * 10 + 127) / 254) as u16
}

/// Electrode pitch register value for one axis, in 0.1 mm units biased by 5 mm.
fn pitch(dimension_mm: u16, matrix_size: u8) -> u8 {
    (dimension_mm * 10 / matrix_size.max(1) as u16)
        .saturating_sub(50)
        .min(u8::MAX as u16) as u8
}

/// maXTouch driver producing up to `FINGERS` digitizer contacts.
pub struct Maxtouch<I2C: I2c, const FINGERS: usize = 5> {
    i2c: I2C,
    config: MaxtouchConfig,
    objects: ObjectAddresses,
    table: Vec<ObjectTableRecord, MAX_OBJECTS>,
    matrix_x: u8,
    matrix_y: u8,
    report: DigitizerReport<FINGERS>,
}

impl<I2C: I2c, const FINGERS: usize> Maxtouch<I2C, FINGERS> {
    pub fn new(i2c: I2C, config: MaxtouchConfig) -> Self {
        Self {
            i2c,
            config,
            objects: ObjectAddresses::default(),
            table: Vec::new(),
            matrix_x: 0,
            matrix_y: 0,
            report: DigitizerReport::default(),
        }
    }

    async fn read_reg(&mut self, register: u16, buf: &mut [u8]) -> Result<(), DriverError> {
        self.i2c
            .write_read(self.config.address, &register.to_le_bytes(), buf)
            .await
            .map_err(|_| DriverError::Bus)
    }

    async fn write_reg(&mut self, register: u16, data: &[u8]) -> Result<(), DriverError> {
        let mut buf = [0u8; 2 + T100_CONFIG_LEN];
        buf[..2].copy_from_slice(&register.to_le_bytes());
        buf[2..2 + data.len()].copy_from_slice(data);
        self.i2c
            .write(self.config.address, &buf[..2 + data.len()])
            .await
            .map_err(|_| DriverError::Bus)
    }

    /// Walk the object table, recording the addresses of recognized objects
    /// and assigning report ids. Ids start at 1 and every object advances the
    /// counter by its report id count, recognized or not, so the base id of
    /// later objects stays correct even when this driver ignores one.
    async fn discover(&mut self) -> Result<(), DriverError> {
        let mut info = [0u8; INFORMATION_BLOCK_LEN];
        self.read_reg(INFORMATION_BLOCK_ADDRESS, &mut info).await?;
        self.matrix_x = self.config.matrix_x_size.unwrap_or(info[4]);
        self.matrix_y = self.config.matrix_y_size.unwrap_or(info[5]);
        let num_objects = info[6];
        info!(
            "maXTouch family {:x} variant {:x}, {} objects",
            info[0], info[1], num_objects
        );

        self.objects = ObjectAddresses::default();
        self.table.clear();
        let mut report_id: u8 = 1;
        for i in 0..num_objects as u16 {
            let mut element = [0u8; OBJECT_TABLE_ELEMENT_LEN];
            let address = OBJECT_TABLE_START + OBJECT_TABLE_ELEMENT_LEN as u16 * i;
            if self.read_reg(address, &mut element).await.is_err() {
                error!("maXTouch - object table element {} read failed", i);
                continue;
            }
            let record = ObjectTableRecord::from_bytes(&element);
            match record.object_type {
                TYPE_MESSAGE_PROCESSOR_T5 => self.objects.t5 = record.address,
                TYPE_POWER_CONFIG_T7 => self.objects.t7 = record.address,
                TYPE_ACQUISITION_CONFIG_T8 => self.objects.t8 = record.address,
                TYPE_MESSAGE_COUNT_T44 => self.objects.t44 = record.address,
                TYPE_CTE_CONFIG_T46 => self.objects.t46 = record.address,
                TYPE_MULTIPLE_TOUCH_T100 => {
                    self.objects.t100 = record.address;
                    self.objects.t100_first_report_id = report_id;
                }
                other => trace!("maXTouch - unhandled object type {}", other),
            }
            report_id = report_id.wrapping_add(
                record
                    .report_ids_per_instance
                    .wrapping_mul(record.instances),
            );
            let _ = self.table.push(record);
        }

        if self.objects.t5 == 0 || self.objects.t44 == 0 || self.objects.t100 == 0 {
            error!("maXTouch - message pipeline objects missing");
            return Err(DriverError::InitFailed);
        }
        Ok(())
    }

    async fn configure_power(&mut self) -> Result<(), DriverError> {
        if self.objects.t7 == 0 {
            return Ok(());
        }
        let t7 = [
            T7_IDLE_ACQ_INTERVAL_MS,
            T7_ACTIVE_ACQ_INTERVAL_MS,
            T7_ACTIVE_TO_IDLE_TIMEOUT,
            T7_CFG_IDLEPIPEEN | T7_CFG_ACTVPIPEEN,
        ];
        self.write_reg(self.objects.t7, &t7).await
    }

    async fn configure_acquisition(&mut self) -> Result<(), DriverError> {
        if self.objects.t8 == 0 {
            return Ok(());
        }
        let mut t8 = [0u8; T8_CONFIG_LEN];
        t8[T8_TCHAUTOCAL] = self.config.recalibrate_after;
        t8[T8_ATCHCALST] = self.config.recalibrate_after;
        t8[T8_ATCHCALSTHR] = 20;
        t8[T8_ATCHFRCCALTHR] = 50;
        t8[T8_ATCHFRCCALRATIO] = 25;
        self.write_reg(self.objects.t8, &t8).await
    }

    async fn configure_cte(&mut self) -> Result<(), DriverError> {
        if self.objects.t46 == 0 {
            return Ok(());
        }
        // Default CTE mode; clearing the block is enough.
        self.write_reg(self.objects.t46, &[0u8; T46_CONFIG_LEN]).await
    }

    fn fill_t100_config(&self, t100: &mut [u8; T100_CONFIG_LEN]) {
        t100[T100_CTRL] = T100_CTRL_ENABLE | T100_CTRL_RPTEN;
        let mut cfg1 = 0;
        if self.config.switch_xy {
            cfg1 |= T100_CFG1_SWITCHXY;
        }
        if self.config.invert_y {
            cfg1 |= T100_CFG1_INVERTY;
        }
        t100[T100_CFG1] = cfg1;
        t100[T100_SCRAUX] = T100_SCRAUX_NUMRPT;
        t100[T100_NUMTCH] = FINGERS as u8;

        let width = self.config.sensor_width_mm;
        let height = self.config.sensor_height_mm;
        t100[T100_XSIZE] = self.matrix_x;
        t100[T100_XPITCH] = pitch(width, self.matrix_x);
        t100[T100_YSIZE] = self.matrix_y;
        t100[T100_YPITCH] = pitch(height, self.matrix_y);
        // Sizes and pitches describe the physical electrode matrix, but the
        // ranges scale the reported axes: with the axes switched, reported X
        // spans the physical Y electrodes and pairs with the sensor height.
        let (x_range_mm, y_range_mm) = if self.config.switch_xy {
            (height, width)
        } else {
            (width, height)
        };
        t100[T100_XRANGE..T100_XRANGE + 2]
            .copy_from_slice(&cpi_to_samples(self.config.cpi, x_range_mm).to_le_bytes());
        t100[T100_YRANGE..T100_YRANGE + 2]
            .copy_from_slice(&cpi_to_samples(self.config.cpi, y_range_mm).to_le_bytes());

        t100[T100_GAIN] = self.config.gain.unwrap_or(self.config.surface.gain());
        t100[T100_DXGAIN] = self.config.dx_gain;
        t100[T100_TCHTHR] = self
            .config
            .touch_threshold
            .unwrap_or(self.config.surface.touch_threshold());
        t100[T100_MRGTHR] = 2;
        t100[T100_MRGHYST] = 2;
        t100[T100_TCHDIDOWN] = 1;
        t100[T100_TCHDIUP] = 1;
        t100[T100_MOVFILTER] = 4 & 0xF;
        t100[T100_MOVSMOOTH] = 224;
        t100[T100_MOVHYSTI] = 6;
        t100[T100_MOVHYSTN] = 4;
    }

    async fn configure_touch_screen(&mut self) -> Result<(), DriverError> {
        let mut t100 = [0u8; T100_CONFIG_LEN];
        // Read-modify-write keeps factory calibration in the fields this
        // driver does not own.
        self.read_reg(self.objects.t100, &mut t100).await?;
        self.fill_t100_config(&mut t100);
        self.write_reg(self.objects.t100, &t100).await
    }

    /// Apply one T100 touch message to the report slots. The two T100 screen
    /// status ids are skipped silently; any other id this driver does not
    /// handle (T6 status, key arrays, ...) is logged.
    fn apply_message(&mut self, message: &[u8; MESSAGE_LEN]) {
        let report_id = message[0];
        let first_status_id = self.objects.t100_first_report_id;
        let first_finger_id = first_status_id.wrapping_add(T100_FINGER_ID_OFFSET);
        if report_id == first_status_id || report_id == first_status_id.wrapping_add(1) {
            return;
        }
        let slot_index = match report_id.checked_sub(first_finger_id) {
            Some(index) if (index as usize) < FINGERS => index as usize,
            _ => {
                info!("maXTouch - unhandled report id {}", report_id);
                return;
            }
        };

        let slot = &mut self.report.fingers[slot_index];
        let event = message[1] & 0x0F;
        match event {
            EVENT_DOWN | EVENT_DOWNSUP => slot.tip = true,
            EVENT_UP | EVENT_UNSUP | EVENT_DOWNUP => slot.tip = false,
            EVENT_MOVE => {}
            _ => {}
        }
        slot.confidence = !matches!(event, EVENT_SUP | EVENT_DOWNSUP);
        // An UP message carries no useful position; keep the last one so the
        // host sees the liftoff point.
        if event != EVENT_UP {
            slot.x = u16::from_le_bytes([message[2], message[3]]);
            slot.y = u16::from_le_bytes([message[4], message[5]]);
        }
    }
}

impl<I2C: I2c, const FINGERS: usize> PointingDriver for Maxtouch<I2C, FINGERS> {
    type Report = DigitizerReport<FINGERS>;

    async fn init(&mut self) -> Result<(), DriverError> {
        self.discover().await?;
        self.configure_power().await?;
        self.configure_acquisition().await?;
        self.configure_cte().await?;
        self.configure_touch_screen().await?;
        info!("maXTouch initialized, {} finger slots", FINGERS);
        Ok(())
    }

    async fn get_report(&mut self) -> DigitizerReport<FINGERS> {
        // Discovery failed or never ran; stay silent instead of polling
        // unknown addresses.
        if self.objects.t44 == 0 {
            return self.report;
        }

        let mut count = [0u8; 1];
        if self.read_reg(self.objects.t44, &mut count).await.is_err() {
            debug!("maXTouch - message count read failed");
            return self.report;
        }

        for _ in 0..count[0] {
            let mut message = [0u8; MESSAGE_LEN];
            if self.read_reg(self.objects.t5, &mut message).await.is_err() {
                debug!("maXTouch - message read failed");
                continue;
            }
            self.apply_message(&message);
        }

        self.report
    }
}

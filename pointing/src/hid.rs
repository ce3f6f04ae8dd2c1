//! Report value types handed to the host report-delivery layer.
//!
//! Reports are produced by value once per poll and never retained by a driver
//! after return; the host copies them onto its interrupt endpoint.

/// Mouse button bits used in
/// [`MouseReport::buttons`](usbd_hid::descriptor::MouseReport) and
/// [`DigitizerReport::buttons`].
pub const BUTTON_1: u8 = 1 << 0;
pub const BUTTON_2: u8 = 1 << 1;
pub const BUTTON_3: u8 = 1 << 2;

/// One slot of a multi-finger digitizer report.
///
/// A slot is allocated implicitly by contact id on a DOWN event, updated on
/// MOVE and cleared (`tip` = false) when the contact lifts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FingerSlot {
    /// Tip switch: the finger is currently on the surface.
    pub tip: bool,
    /// Cleared when the sensor classifies the contact as unintentional
    /// (palm suppression).
    pub confidence: bool,
    pub x: u16,
    pub y: u16,
}

/// Multi-finger digitizer report, distinct from the single-pointer relative
/// mouse report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DigitizerReport<const FINGERS: usize> {
    pub fingers: [FingerSlot; FINGERS],
    /// Up to three buttons in the low bits, see [`BUTTON_1`].
    pub buttons: u8,
}

impl<const FINGERS: usize> Default for DigitizerReport<FINGERS> {
    fn default() -> Self {
        Self {
            fingers: [FingerSlot::default(); FINGERS],
            buttons: 0,
        }
    }
}

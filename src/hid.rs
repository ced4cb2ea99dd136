//! HID transport for vendor-specific device commands.
//!
//! The lighthouse headset is powered on and off through opaque feature
//! reports on its HID interface. The blobs are sent verbatim; their contents
//! are not interpreted by this crate. Pose data never travels over this link,
//! it comes from the tracking subsystem.

use crate::Result;
use hidapi::{HidApi, HidDevice};

pub const HTC_VID: u16 = 0x0bb4;
pub const VIVE_HMD_PID: u16 = 0x2c87;

static MAGIC_POWER_ON: [u8; 64] = [
    0x04, 0x78, 0x29, 0x38, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0xa8, 0x0d,
    0x76, 0x00, 0x40, 0xfc, 0x01, 0x05, 0xfa, 0xec, 0xd1, 0x6d, 0x00, 0x00, 0x6c, 0x00, 0x00,
    0x00, 0x00, 0x00, 0xa8, 0x0d, 0x76, 0x00, 0x68, 0xfc, 0x01, 0x05, 0x2c, 0xb0, 0x2e, 0x65,
    0x7a, 0x0d, 0x76, 0x00, 0x68, 0x54, 0x72, 0x00, 0x18, 0x54, 0x72, 0x00, 0x00, 0x6a, 0x72,
    0x00, 0x00, 0x00, 0x00,
];

static MAGIC_POWER_OFF1: [u8; 64] = [
    0x04, 0x78, 0x29, 0x38, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x30, 0x05,
    0x77, 0x00, 0x30, 0x05, 0x77, 0x00, 0x6c, 0x4d, 0x37, 0x65, 0x40, 0xf9, 0x33, 0x00, 0x04,
    0xf8, 0xa3, 0x04, 0x04, 0x00, 0x00, 0x00, 0x70, 0xb0, 0x72, 0x00, 0xf4, 0xf7, 0xa3, 0x04,
    0x7c, 0xf8, 0x33, 0x00, 0x0c, 0xf8, 0xa3, 0x04, 0x0a, 0x6e, 0x29, 0x65, 0x24, 0xf9, 0x33,
    0x00, 0x00, 0x00, 0x00,
];

static MAGIC_POWER_OFF2: [u8; 64] = [
    0x04, 0x78, 0x29, 0x38, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x30, 0x05,
    0x77, 0x00, 0xe4, 0xf7, 0x33, 0x00, 0xe4, 0xf7, 0x33, 0x00, 0x60, 0x6e, 0x72, 0x00, 0xb4,
    0xf7, 0x33, 0x00, 0x04, 0x00, 0x00, 0x00, 0x70, 0xb0, 0x72, 0x00, 0x90, 0xf7, 0x33, 0x00,
    0x7c, 0xf8, 0x33, 0x00, 0xd0, 0xf7, 0x33, 0x00, 0x3c, 0x68, 0x29, 0x65, 0x24, 0xf9, 0x33,
    0x00, 0x00, 0x00, 0x00,
];

static MAGIC_ENABLE_LIGHTHOUSE: [u8; 5] = [0x04, 0x00, 0x00, 0x00, 0x00];

/// True when a hidapi device entry is a lighthouse headset's HID interface.
pub fn is_lighthouse_hmd(d: &hidapi::DeviceInfo) -> bool {
    d.vendor_id() == HTC_VID && d.product_id() == VIVE_HMD_PID
}

pub fn create_hid_api() -> Result<HidApi> {
    let api = HidApi::new()?;
    #[cfg(target_os = "macos")]
    {
        // Keep HID opens shared on macOS to avoid seizing the interface.
        api.set_open_exclusive(false);
    }
    Ok(api)
}

/// Feature-report transport to one headset.
pub struct HidTransport {
    device: HidDevice,
}

impl HidTransport {
    pub fn new(device: HidDevice) -> Self {
        Self { device }
    }

    /// Wake the displays and sensors.
    pub fn power_on(&self) -> Result<()> {
        self.device.send_feature_report(&MAGIC_POWER_ON)?;
        Ok(())
    }

    /// Put the headset back to standby. Two reports, in order.
    pub fn power_off(&self) -> Result<()> {
        self.device.send_feature_report(&MAGIC_POWER_OFF1)?;
        self.device.send_feature_report(&MAGIC_POWER_OFF2)?;
        Ok(())
    }

    /// Enable base-station tracking on the headset side.
    pub fn enable_lighthouse(&self) -> Result<()> {
        self.device.send_feature_report(&MAGIC_ENABLE_LIGHTHOUSE)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_blobs_carry_report_id() {
        // All vendor reports address HID report 0x04.
        assert_eq!(MAGIC_POWER_ON[0], 0x04);
        assert_eq!(MAGIC_POWER_OFF1[0], 0x04);
        assert_eq!(MAGIC_POWER_OFF2[0], 0x04);
        assert_eq!(MAGIC_ENABLE_LIGHTHOUSE[0], 0x04);
    }

    #[test]
    fn test_power_on_and_off_differ_in_mode_byte() {
        assert_eq!(MAGIC_POWER_ON[4], 0x01);
        assert_eq!(MAGIC_POWER_OFF1[4], 0x00);
        assert_eq!(MAGIC_POWER_OFF2[4], 0x00);
    }
}

//! Decoding of Blood Pressure Measurement notification frames.
//!
//! Each notification carries a fixed-layout 20-byte frame. Multi-byte fields
//! are little-endian. The status byte at offset 17 packs six categories into
//! eight bits, with bit 0 being the most significant bit of the byte.

use std::fmt;

use thiserror::Error;

/// Exact length of one measurement frame in bytes.
pub const FRAME_LEN: usize = 20;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("measurement frame must be 20 bytes, got {0}")]
    FrameLength(usize),

    #[error("measurement payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Whether the cuff detected body movement during the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMovement {
    None,
    Detected,
}

impl fmt::Display for BodyMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BodyMovement::None => "No body movement",
            BodyMovement::Detected => "Body movement",
        })
    }
}

/// Whether the cuff was wrapped tightly enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuffFit {
    Proper,
    TooLoose,
}

impl fmt::Display for CuffFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CuffFit::Proper => "Cuff fits properly",
            CuffFit::TooLoose => "Cuff is too loose",
        })
    }
}

/// Whether an irregular pulse was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrregularPulse {
    None,
    Detected,
}

impl fmt::Display for IrregularPulse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IrregularPulse::None => "No irregular pulse",
            IrregularPulse::Detected => "Irregular pulse",
        })
    }
}

/// Pulse rate relative to the device's accepted range. The `0b11` code is
/// reserved by the profile and reported as [`PulseRateRange::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseRateRange {
    InRange,
    ExceedsUpperLimit,
    BelowLowerLimit,
    Undefined,
}

impl fmt::Display for PulseRateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PulseRateRange::InRange => "In range",
            PulseRateRange::ExceedsUpperLimit => "Exceeds upper limit",
            PulseRateRange::BelowLowerLimit => "Below lower limit",
            PulseRateRange::Undefined => "Undefined",
        })
    }
}

/// Whether the measurement was taken in a proper position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPosition {
    Proper,
    Improper,
}

impl fmt::Display for MeasurementPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MeasurementPosition::Proper => "Proper position",
            MeasurementPosition::Improper => "Improper position",
        })
    }
}

/// Vendor-specific HSD indicator. Not part of the standard SIG profile.
/// The `0b11` code is reserved and reported as [`HsdStatus::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsdStatus {
    NotDetected,
    Detected,
    UnableToJudge,
    Undefined,
}

impl fmt::Display for HsdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HsdStatus::NotDetected => "HSD not detected",
            HsdStatus::Detected => "HSD detected",
            HsdStatus::UnableToJudge => "Unable to judge",
            HsdStatus::Undefined => "Undefined",
        })
    }
}

/// Status categories packed into the byte at offset 17.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    pub body_movement: BodyMovement,
    pub cuff_fit: CuffFit,
    pub irregular_pulse: IrregularPulse,
    pub pulse_rate_range: PulseRateRange,
    pub measurement_position: MeasurementPosition,
    pub hsd: HsdStatus,
}

impl StatusFlags {
    /// Expands a status byte. Bit 0 is the most significant bit of the byte,
    /// bit 7 the least significant. Bits 3-4 and 6-7 are two-bit codes with
    /// the earlier bit as the high bit.
    pub fn from_byte(byte: u8) -> Self {
        let bit = |index: u8| (byte >> (7 - index)) & 1;
        let code = |high: u8, low: u8| (bit(high) << 1) | bit(low);

        Self {
            body_movement: match bit(0) {
                0 => BodyMovement::None,
                _ => BodyMovement::Detected,
            },
            cuff_fit: match bit(1) {
                0 => CuffFit::Proper,
                _ => CuffFit::TooLoose,
            },
            irregular_pulse: match bit(2) {
                0 => IrregularPulse::None,
                _ => IrregularPulse::Detected,
            },
            pulse_rate_range: match code(3, 4) {
                0b00 => PulseRateRange::InRange,
                0b01 => PulseRateRange::ExceedsUpperLimit,
                0b10 => PulseRateRange::BelowLowerLimit,
                _ => PulseRateRange::Undefined,
            },
            measurement_position: match bit(5) {
                0 => MeasurementPosition::Proper,
                _ => MeasurementPosition::Improper,
            },
            hsd: match code(6, 7) {
                0b00 => HsdStatus::NotDetected,
                0b01 => HsdStatus::Detected,
                0b10 => HsdStatus::UnableToJudge,
                _ => HsdStatus::Undefined,
            },
        }
    }
}

/// One decoded blood pressure measurement.
///
/// Pressures are in mmHg. The timestamp is the device-local clock at the
/// time the measurement was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Protocol header byte. Constant per device, not clinically meaningful.
    pub header: u8,
    pub systolic: u16,
    pub diastolic: u16,
    /// Reserved by the profile; always 0 on this device family.
    pub mean_arterial_pressure: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub pulse_rate: u16,
    /// 0 or 1, whichever of the two paired users took the measurement.
    pub user_id: u8,
    pub flags: StatusFlags,
}

impl Measurement {
    /// Decodes one notification frame.
    ///
    /// The frame must be exactly [`FRAME_LEN`] bytes; anything else fails
    /// with [`DecodeError::FrameLength`].
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() != FRAME_LEN {
            return Err(DecodeError::FrameLength(frame.len()));
        }

        let le16 = |offset: usize| u16::from_le_bytes([frame[offset], frame[offset + 1]]);

        // Byte 6 is the profile's extra flags byte and carries no clinical
        // data on this device family. Bytes 18-19 are reserved.
        Ok(Self {
            header: frame[0],
            systolic: le16(1),
            diastolic: le16(3),
            mean_arterial_pressure: frame[5],
            year: le16(7),
            month: frame[9],
            day: frame[10],
            hours: frame[11],
            minutes: frame[12],
            seconds: frame[13],
            pulse_rate: le16(14),
            user_id: frame[16],
            flags: StatusFlags::from_byte(frame[17]),
        })
    }

    /// Decodes a frame delivered as base64 text, for transports that hand
    /// the notification value over before decoding it.
    pub fn from_base64(payload: &str) -> Result<Self, DecodeError> {
        let frame = base64::decode(payload)?;
        Self::decode(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_FRAME: [u8; 20] = [
        0x00, 0x78, 0x00, 0x50, 0x00, 0x00, 0x00, 0xE7, 0x07, 0x06, 0x0F, 0x0A, 0x1E, 0x00, 0x48,
        0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    #[test]
    fn decodes_reference_frame() {
        let m = Measurement::decode(&REFERENCE_FRAME).unwrap();

        assert_eq!(m.header, 0);
        assert_eq!(m.systolic, 120);
        assert_eq!(m.diastolic, 80);
        assert_eq!(m.mean_arterial_pressure, 0);
        assert_eq!(m.year, 2023);
        assert_eq!(m.month, 6);
        assert_eq!(m.day, 15);
        assert_eq!(m.hours, 10);
        assert_eq!(m.minutes, 30);
        assert_eq!(m.seconds, 0);
        assert_eq!(m.pulse_rate, 72);
        assert_eq!(m.user_id, 0);

        assert_eq!(m.flags.body_movement, BodyMovement::None);
        assert_eq!(m.flags.cuff_fit, CuffFit::Proper);
        assert_eq!(m.flags.irregular_pulse, IrregularPulse::None);
        assert_eq!(m.flags.pulse_rate_range, PulseRateRange::InRange);
        assert_eq!(m.flags.measurement_position, MeasurementPosition::Proper);
        assert_eq!(m.flags.hsd, HsdStatus::NotDetected);
    }

    #[test]
    fn decodes_mixed_status_byte() {
        let mut frame = REFERENCE_FRAME;
        frame[17] = 0b1010_0101;

        let flags = Measurement::decode(&frame).unwrap().flags;

        assert_eq!(flags.body_movement, BodyMovement::Detected);
        assert_eq!(flags.cuff_fit, CuffFit::Proper);
        assert_eq!(flags.irregular_pulse, IrregularPulse::Detected);
        assert_eq!(flags.pulse_rate_range, PulseRateRange::InRange);
        assert_eq!(flags.measurement_position, MeasurementPosition::Improper);
        assert_eq!(flags.hsd, HsdStatus::Detected);
    }

    #[test]
    fn status_byte_mapping_is_exhaustive() {
        for byte in 0..=u8::MAX {
            let flags = StatusFlags::from_byte(byte);
            let bit = |index: u8| (byte >> (7 - index)) & 1;

            assert_eq!(flags.body_movement == BodyMovement::Detected, bit(0) == 1);
            assert_eq!(flags.cuff_fit == CuffFit::TooLoose, bit(1) == 1);
            assert_eq!(
                flags.irregular_pulse == IrregularPulse::Detected,
                bit(2) == 1
            );

            let expected_range = match (bit(3) << 1) | bit(4) {
                0b00 => PulseRateRange::InRange,
                0b01 => PulseRateRange::ExceedsUpperLimit,
                0b10 => PulseRateRange::BelowLowerLimit,
                _ => PulseRateRange::Undefined,
            };
            assert_eq!(flags.pulse_rate_range, expected_range);

            assert_eq!(
                flags.measurement_position == MeasurementPosition::Improper,
                bit(5) == 1
            );

            let expected_hsd = match (bit(6) << 1) | bit(7) {
                0b00 => HsdStatus::NotDetected,
                0b01 => HsdStatus::Detected,
                0b10 => HsdStatus::UnableToJudge,
                _ => HsdStatus::Undefined,
            };
            assert_eq!(flags.hsd, expected_hsd);
        }
    }

    #[test]
    fn reserved_codes_map_to_undefined() {
        // Bits 3-4 set -> pulse rate range 0b11, bits 6-7 set -> HSD 0b11.
        let flags = StatusFlags::from_byte(0b0001_1011);
        assert_eq!(flags.pulse_rate_range, PulseRateRange::Undefined);
        assert_eq!(flags.hsd, HsdStatus::Undefined);
        assert_eq!(flags.pulse_rate_range.to_string(), "Undefined");
        assert_eq!(flags.hsd.to_string(), "Undefined");
    }

    #[test]
    fn status_display_matches_profile_strings() {
        let clear = StatusFlags::from_byte(0x00);
        assert_eq!(clear.body_movement.to_string(), "No body movement");
        assert_eq!(clear.cuff_fit.to_string(), "Cuff fits properly");
        assert_eq!(clear.irregular_pulse.to_string(), "No irregular pulse");
        assert_eq!(clear.pulse_rate_range.to_string(), "In range");
        assert_eq!(clear.measurement_position.to_string(), "Proper position");
        assert_eq!(clear.hsd.to_string(), "HSD not detected");

        let set = StatusFlags::from_byte(0xFF);
        assert_eq!(set.body_movement.to_string(), "Body movement");
        assert_eq!(set.cuff_fit.to_string(), "Cuff is too loose");
        assert_eq!(set.irregular_pulse.to_string(), "Irregular pulse");
        assert_eq!(set.measurement_position.to_string(), "Improper position");
    }

    #[test]
    fn rejects_wrong_frame_lengths() {
        assert_eq!(
            Measurement::decode(&[]),
            Err(DecodeError::FrameLength(0))
        );
        assert_eq!(
            Measurement::decode(&REFERENCE_FRAME[..19]),
            Err(DecodeError::FrameLength(19))
        );

        let long = [0u8; 21];
        assert_eq!(Measurement::decode(&long), Err(DecodeError::FrameLength(21)));
    }

    #[test]
    fn decodes_base64_payload() {
        let payload = base64::encode(REFERENCE_FRAME);
        let m = Measurement::from_base64(&payload).unwrap();
        assert_eq!(m.systolic, 120);
        assert_eq!(m.diastolic, 80);
    }

    #[test]
    fn rejects_malformed_base64_payload() {
        assert!(matches!(
            Measurement::from_base64("!!not base64!!"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn rejects_base64_payload_of_wrong_length() {
        let payload = base64::encode(&REFERENCE_FRAME[..16]);
        assert_eq!(
            Measurement::from_base64(&payload),
            Err(DecodeError::FrameLength(16))
        );
    }
}

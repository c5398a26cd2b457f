//! Fixed-layout binary frames for the three outbound message kinds.
//!
//! Every frame is an 8-byte header followed by a kind-specific body, all
//! multi-byte integers in network byte order:
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬──────────────┐
//! │ i16 msg type │ i16 version  │ i16 source   │ i16 body len │
//! └──────────────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! | kind                | type | body | total |
//! |---------------------|------|------|-------|
//! | basic status        | 1000 | 24   | 32    |
//! | signal request      | 2000 | 24   | 32    |
//! | vehicle-body status | 3000 | 15   | 23    |
//!
//! Angles and positions are scaled by 1e6, speeds and accelerations by 1e3,
//! then truncated toward zero into `i32`.

use serde::{Deserialize, Serialize};

/// Protocol version stamped into every header.
pub const PROTOCOL_VERSION: i16 = 1;

/// Source identifier stamped into every header.
pub const SOURCE_ID: i16 = 55;

/// Header length in bytes.
pub const HEADER_LEN: usize = 8;

const ANGLE_SCALE: f64 = 1_000_000.0;
const SPEED_SCALE: f64 = 1_000.0;
const COORD_OFFSET: f64 = 180.0;
const ELEVATION_OFFSET: f64 = 500.0;

/// Message type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    BasicStatus,
    SignalRequest,
    BodyStatus,
}

impl MessageKind {
    /// The on-wire type code.
    pub fn code(&self) -> i16 {
        match self {
            MessageKind::BasicStatus => 1000,
            MessageKind::SignalRequest => 2000,
            MessageKind::BodyStatus => 3000,
        }
    }

    /// Body length in bytes.
    pub fn body_len(&self) -> usize {
        match self {
            MessageKind::BasicStatus | MessageKind::SignalRequest => 24,
            MessageKind::BodyStatus => 15,
        }
    }

    /// Total frame length in bytes.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.body_len()
    }

    /// Looks up a kind from its type code.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1000 => Some(MessageKind::BasicStatus),
            2000 => Some(MessageKind::SignalRequest),
            3000 => Some(MessageKind::BodyStatus),
            _ => None,
        }
    }

    /// Reads the kind from the first two bytes of a frame.
    pub fn peek(frame: &[u8]) -> Option<Self> {
        let bytes: [u8; 2] = frame.get(0..2)?.try_into().ok()?;
        Self::from_code(i16::from_be_bytes(bytes))
    }
}

/// Gear selector position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum GearState {
    #[default]
    Unknown = 0,
    Park = 1,
    Reverse = 2,
    Drive = 3,
    Other = 4,
}

impl GearState {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => GearState::Park,
            2 => GearState::Reverse,
            3 => GearState::Drive,
            4 => GearState::Other,
            _ => GearState::Unknown,
        }
    }
}

/// Turn signal lever position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TurnSignal {
    #[default]
    Unknown = 0,
    Off = 1,
    Left = 2,
    Right = 3,
}

impl TurnSignal {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => TurnSignal::Off,
            2 => TurnSignal::Left,
            3 => TurnSignal::Right,
            _ => TurnSignal::Unknown,
        }
    }
}

/// Discrete body state carried by the vehicle-body message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BodyState {
    pub gear: GearState,
    pub turn_signal: TurnSignal,
    pub brake_applied: bool,
    pub front_doors_open: bool,
    pub rear_doors_open: bool,
}

impl BodyState {
    pub const BRAKE_BIT: u8 = 0x01;
    pub const FRONT_DOORS_BIT: u8 = 0x02;
    pub const REAR_DOORS_BIT: u8 = 0x04;

    /// Packs the boolean state into the flags byte.
    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.brake_applied {
            flags |= Self::BRAKE_BIT;
        }
        if self.front_doors_open {
            flags |= Self::FRONT_DOORS_BIT;
        }
        if self.rear_doors_open {
            flags |= Self::REAR_DOORS_BIT;
        }
        flags
    }
}

/// Position and kinematics shared by basic status and signal request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicStatus {
    pub vehicle_id: i32,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub lat: f64,
    pub lon: f64,
    pub elevation_m: f64,
}

/// Priority request tied to a vehicle role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRequest {
    pub vehicle_id: i32,
    pub heading_deg: f64,
    pub speed_mps: f64,
    pub lat: f64,
    pub lon: f64,
    /// Role code, e.g. 12 police, 13 fire, 14 ambulance
    pub role: i32,
}

/// Discrete vehicle state plus speed and acceleration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyStatus {
    pub vehicle_id: i32,
    pub speed_mps: f64,
    pub body: BodyState,
    pub accel_mps2: f64,
}

fn scaled(value: f64, scale: f64) -> i32 {
    // `as` saturates and truncates toward zero
    (value * scale) as i32
}

fn put_header(buf: &mut Vec<u8>, kind: MessageKind) {
    buf.extend_from_slice(&kind.code().to_be_bytes());
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.extend_from_slice(&SOURCE_ID.to_be_bytes());
    buf.extend_from_slice(&(kind.body_len() as i16).to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn put_position(buf: &mut Vec<u8>, vehicle_id: i32, heading: f64, speed: f64, lat: f64, lon: f64) {
    put_i32(buf, vehicle_id);
    put_i32(buf, scaled(heading, ANGLE_SCALE));
    put_i32(buf, scaled(speed, SPEED_SCALE));
    put_i32(buf, scaled(lat + COORD_OFFSET, ANGLE_SCALE));
    put_i32(buf, scaled(lon + COORD_OFFSET, ANGLE_SCALE));
}

impl BasicStatus {
    pub fn encode(&self) -> Vec<u8> {
        let kind = MessageKind::BasicStatus;
        let mut buf = Vec::with_capacity(kind.frame_len());
        put_header(&mut buf, kind);
        put_position(&mut buf, self.vehicle_id, self.heading_deg, self.speed_mps, self.lat, self.lon);
        put_i32(&mut buf, scaled(self.elevation_m + ELEVATION_OFFSET, SPEED_SCALE));
        buf
    }
}

impl SignalRequest {
    pub fn encode(&self) -> Vec<u8> {
        let kind = MessageKind::SignalRequest;
        let mut buf = Vec::with_capacity(kind.frame_len());
        put_header(&mut buf, kind);
        put_position(&mut buf, self.vehicle_id, self.heading_deg, self.speed_mps, self.lat, self.lon);
        put_i32(&mut buf, self.role);
        buf
    }
}

impl BodyStatus {
    pub fn encode(&self) -> Vec<u8> {
        let kind = MessageKind::BodyStatus;
        let mut buf = Vec::with_capacity(kind.frame_len());
        put_header(&mut buf, kind);
        put_i32(&mut buf, self.vehicle_id);
        put_i32(&mut buf, scaled(self.speed_mps, SPEED_SCALE));
        buf.push(self.body.gear as u8);
        buf.push(self.body.turn_signal as u8);
        buf.push(self.body.flags());
        put_i32(&mut buf, scaled(self.accel_mps2, SPEED_SCALE));
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn i16_at(frame: &[u8], offset: usize) -> i16 {
        i16::from_be_bytes([frame[offset], frame[offset + 1]])
    }

    fn i32_at(frame: &[u8], offset: usize) -> i32 {
        i32::from_be_bytes(frame[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_basic_status_layout_recovers_fields() {
        let frame = BasicStatus {
            vehicle_id: 42,
            heading_deg: 90.0,
            speed_mps: 10.0,
            lat: 39.1,
            lon: -94.5,
            elevation_m: 0.0,
        }
        .encode();

        assert_eq!(frame.len(), 32);
        assert_eq!(i16_at(&frame, 0), 1000);
        assert_eq!(i16_at(&frame, 2), 1);
        assert_eq!(i16_at(&frame, 4), 55);
        assert_eq!(i16_at(&frame, 6), 24);

        assert_eq!(i32_at(&frame, 8), 42);
        assert_abs_diff_eq!(i32_at(&frame, 12) as f64 / 1e6, 90.0, epsilon = 1e-6);
        assert_abs_diff_eq!(i32_at(&frame, 16) as f64 / 1e3, 10.0, epsilon = 1e-3);
        assert_abs_diff_eq!(i32_at(&frame, 20) as f64 / 1e6 - 180.0, 39.1, epsilon = 1e-6);
        assert_abs_diff_eq!(i32_at(&frame, 24) as f64 / 1e6 - 180.0, -94.5, epsilon = 1e-6);
        assert_abs_diff_eq!(i32_at(&frame, 28) as f64 / 1e3 - 500.0, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_signal_request_carries_role() {
        let frame = SignalRequest {
            vehicle_id: 1042,
            heading_deg: 180.5,
            speed_mps: 4.4704,
            lat: 39.099639,
            lon: -94.578555,
            role: 14,
        }
        .encode();

        assert_eq!(frame.len(), 32);
        assert_eq!(MessageKind::peek(&frame), Some(MessageKind::SignalRequest));
        assert_eq!(i16_at(&frame, 6), 24);
        assert_eq!(i32_at(&frame, 8), 1042);
        assert_eq!(i32_at(&frame, 16), 4470);
        assert_eq!(i32_at(&frame, 28), 14);
    }

    #[test]
    fn test_body_status_layout() {
        let frame = BodyStatus {
            vehicle_id: 2001,
            speed_mps: 12.5,
            body: BodyState {
                gear: GearState::Drive,
                turn_signal: TurnSignal::Left,
                brake_applied: true,
                front_doors_open: false,
                rear_doors_open: true,
            },
            accel_mps2: -1.25,
        }
        .encode();

        assert_eq!(frame.len(), 23);
        assert_eq!(i16_at(&frame, 0), 3000);
        assert_eq!(i16_at(&frame, 6), 15);
        assert_eq!(i32_at(&frame, 8), 2001);
        assert_eq!(i32_at(&frame, 12), 12_500);
        assert_eq!(frame[16], 3);
        assert_eq!(frame[17], 2);
        assert_eq!(frame[18], 0b101);
        assert_eq!(i32_at(&frame, 19), -1_250);
    }

    #[test]
    fn test_header_is_big_endian() {
        let frame = BasicStatus {
            vehicle_id: 1,
            heading_deg: 0.0,
            speed_mps: 0.0,
            lat: 0.0,
            lon: 0.0,
            elevation_m: 0.0,
        }
        .encode();

        assert_eq!(&frame[..8], &[0x03, 0xE8, 0x00, 0x01, 0x00, 0x37, 0x00, 0x18]);
        assert_eq!(&frame[8..12], &[0, 0, 0, 1]);
    }

    #[test]
    fn test_enum_codes_roundtrip() {
        for code in 0..=4u8 {
            assert_eq!(GearState::from_code(code) as u8, code);
        }
        for code in 0..=3u8 {
            assert_eq!(TurnSignal::from_code(code) as u8, code);
        }
        assert_eq!(GearState::from_code(9), GearState::Unknown);
        assert_eq!(MessageKind::from_code(1234), None);
        assert_eq!(MessageKind::peek(&[0x0B]), None);
    }
}

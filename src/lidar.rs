// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common sensor types, status codes and error handling.
//!
//! These types are shared by the packet codec, the sensor feed, the capture
//! replay controller and the publishing pipeline.

use serde::Serialize;
use std::fmt;

/// Opaque sensor identity supplied by the feed.
///
/// Live sensors use their source IPv4 address. Sensors replayed from a
/// capture additionally carry [`HANDLE_FLAG_MOCK`].
pub type SensorHandle = u64;

/// Indicates that the handle was generated by capture replay.
pub const HANDLE_FLAG_MOCK: SensorHandle = 0x1_0000_0000;

/// Maximum length of [`SensorInfo::model_name`] in bytes.
pub const MODEL_NAME_MAX: usize = 27;

/// Maximum length of [`SensorInfo::firmware_version`] in bytes.
pub const FIRMWARE_VERSION_MAX: usize = 31;

/// Single laser return in sensor image coordinates (focal length = 1).
///
/// Borrowed from the feed for the duration of a callback only.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawPoint {
    /// Unix time in microseconds
    pub timestamp: u64,
    /// X image coordinate
    pub image_x: f32,
    /// Z image coordinate
    pub image_z: f32,
    /// Distance in meters
    pub distance: f32,
    /// 0-1 scaled intensity
    pub intensity: f32,
    pub return_number: u8,
    /// False when the point was clipped by the sensor
    pub valid: bool,
}

/// Point in the sensor's Cartesian frame, derived from a [`RawPoint`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CartesianPoint {
    /// Unix time in microseconds
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
    pub return_number: u8,
    pub valid: bool,
}

/// Sensor hardware model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum SensorModel {
    #[default]
    Unknown,
    Hr80T,
    Hr80M,
    Hr80W,
    Sora200,
    Vista860,
}

impl From<u32> for SensorModel {
    fn from(value: u32) -> Self {
        match value {
            1 => SensorModel::Hr80T,
            2 => SensorModel::Hr80M,
            3 => SensorModel::Hr80W,
            4 => SensorModel::Sora200,
            5 => SensorModel::Vista860,
            _ => SensorModel::Unknown,
        }
    }
}

impl From<SensorModel> for u32 {
    fn from(model: SensorModel) -> Self {
        match model {
            SensorModel::Unknown => 0,
            SensorModel::Hr80T => 1,
            SensorModel::Hr80M => 2,
            SensorModel::Hr80W => 3,
            SensorModel::Sora200 => 4,
            SensorModel::Vista860 => 5,
        }
    }
}

/// GPS timestamp reported by the sensor (GMT).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GpsTimestamp {
    /// 0-99 (2017 -> 17)
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
}

/// Sensor status flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SensorFlags {
    /// Created by capture replay
    pub is_mocked: bool,
    /// GPS PPS is available
    pub is_pps_connected: bool,
    /// GPS NMEA is available
    pub is_nmea_connected: bool,
    pub is_calibrated: bool,
}

impl SensorFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            is_mocked: bits & 0x01 != 0,
            is_pps_connected: bits & 0x02 != 0,
            is_nmea_connected: bits & 0x04 != 0,
            is_calibrated: bits & 0x08 != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        (self.is_mocked as u8)
            | (self.is_pps_connected as u8) << 1
            | (self.is_nmea_connected as u8) << 2
            | (self.is_calibrated as u8) << 3
    }
}

/// Sensor metadata, refreshed on every information packet.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SensorInfo {
    pub handle: SensorHandle,
    pub serial_number: u64,
    /// At most [`MODEL_NAME_MAX`] bytes
    pub model_name: String,
    pub model: SensorModel,
    /// At most [`FIRMWARE_VERSION_MAX`] bytes
    pub firmware_version: String,
    /// Celsius
    pub temperature: f32,
    /// Percent
    pub humidity: f32,
    /// Hours
    pub age: f32,
    pub gps_timestamp: GpsTimestamp,
    pub return_count: u8,
    pub flags: SensorFlags,
}

impl SensorInfo {
    /// Human readable sensor name: the decimal serial number.
    ///
    /// Used for channel naming instead of the handle, which differs between
    /// live and replayed sessions of the same sensor.
    pub fn name(&self) -> String {
        self.serial_number.to_string()
    }
}

/// Sensor lifecycle events delivered by the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorEvent {
    Attach,
    Detach,
    /// The sensor completed a scan frame.
    FrameBoundary,
}

impl fmt::Display for SensorEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SensorEvent::Attach => write!(f, "attach"),
            SensorEvent::Detach => write!(f, "detach"),
            SensorEvent::FrameBoundary => write!(f, "frame"),
        }
    }
}

/// Status code carried by feed callbacks.
///
/// Values match the numeric codes used by the sensor SDK so that logs can be
/// correlated with sensor tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorCode {
    #[default]
    Success,
    Generic,
    OutOfMemory,
    SensorNotFound,
    SdkVersionMismatch,
    /// Networking error
    Communication,
    TooManyCallbacks,
    InvalidArguments,
    AlreadyInitialized,
    NotInitialized,
    InvalidFileType,
    FileIo,
    CorruptFile,
    NotOpen,
    Eof,
}

impl ErrorCode {
    /// Returns true for every code except [`ErrorCode::Success`].
    pub fn is_error(&self) -> bool {
        *self != ErrorCode::Success
    }

    /// SDK style name of the code.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::Success => "CEPTON_SUCCESS",
            ErrorCode::Generic => "CEPTON_ERROR_GENERIC",
            ErrorCode::OutOfMemory => "CEPTON_ERROR_OUT_OF_MEMORY",
            ErrorCode::SensorNotFound => "CEPTON_ERROR_SENSOR_NOT_FOUND",
            ErrorCode::SdkVersionMismatch => "CEPTON_ERROR_SDK_VERSION_MISMATCH",
            ErrorCode::Communication => "CEPTON_ERROR_COMMUNICATION",
            ErrorCode::TooManyCallbacks => "CEPTON_ERROR_TOO_MANY_CALLBACKS",
            ErrorCode::InvalidArguments => "CEPTON_ERROR_INVALID_ARGUMENTS",
            ErrorCode::AlreadyInitialized => "CEPTON_ERROR_ALREADY_INITIALIZED",
            ErrorCode::NotInitialized => "CEPTON_ERROR_NOT_INITIALIZED",
            ErrorCode::InvalidFileType => "CEPTON_ERROR_INVALID_FILE_TYPE",
            ErrorCode::FileIo => "CEPTON_ERROR_FILE_IO",
            ErrorCode::CorruptFile => "CEPTON_ERROR_CORRUPT_FILE",
            ErrorCode::NotOpen => "CEPTON_ERROR_NOT_OPEN",
            ErrorCode::Eof => "CEPTON_ERROR_EOF",
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(value: i32) -> Self {
        match value {
            0 => ErrorCode::Success,
            -2 => ErrorCode::OutOfMemory,
            -4 => ErrorCode::SensorNotFound,
            -5 => ErrorCode::SdkVersionMismatch,
            -6 => ErrorCode::Communication,
            -7 => ErrorCode::TooManyCallbacks,
            -8 => ErrorCode::InvalidArguments,
            -9 => ErrorCode::AlreadyInitialized,
            -10 => ErrorCode::NotInitialized,
            -11 => ErrorCode::InvalidFileType,
            -12 => ErrorCode::FileIo,
            -13 => ErrorCode::CorruptFile,
            -14 => ErrorCode::NotOpen,
            -15 => ErrorCode::Eof,
            _ => ErrorCode::Generic,
        }
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Success => 0,
            ErrorCode::Generic => -1,
            ErrorCode::OutOfMemory => -2,
            ErrorCode::SensorNotFound => -4,
            ErrorCode::SdkVersionMismatch => -5,
            ErrorCode::Communication => -6,
            ErrorCode::TooManyCallbacks => -7,
            ErrorCode::InvalidArguments => -8,
            ErrorCode::AlreadyInitialized => -9,
            ErrorCode::NotInitialized => -10,
            ErrorCode::InvalidFileType => -11,
            ErrorCode::FileIo => -12,
            ErrorCode::CorruptFile => -13,
            ErrorCode::NotOpen => -14,
            ErrorCode::Eof => -15,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name(), i32::from(*self))
    }
}

/// Common error type for feed, capture and publishing operations.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, capture file)
    Io(std::io::Error),
    /// Capture file header is not a supported format
    InvalidFormat(String),
    /// Capture file content is malformed
    CorruptFile(String),
    /// Capture replay is not open
    NotOpen,
    /// Capture replay is already open
    AlreadyOpen,
    /// Capture playback thread is not running
    NotInitialized,
    /// Argument out of range
    InvalidArgument(String),
    /// Capture replay reached the end of the file
    Eof,
    /// Sensor handle not present in the registry
    SensorNotFound(SensorHandle),
    /// Invalid packet data
    InvalidPacket(String),
    /// Unexpected end of data at given byte position
    UnexpectedEnd(usize),
    /// Output sink could not be created or failed to publish
    Sink(String),
    /// Configuration error
    Config(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidFormat(msg) => write!(f, "invalid capture format: {}", msg),
            Error::CorruptFile(msg) => write!(f, "corrupt capture file: {}", msg),
            Error::NotOpen => write!(f, "capture replay is not open"),
            Error::AlreadyOpen => write!(f, "capture replay is already open"),
            Error::NotInitialized => write!(f, "capture replay is not initialized"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Eof => write!(f, "end of capture"),
            Error::SensorNotFound(handle) => write!(f, "sensor not found: {:#x}", handle),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::UnexpectedEnd(len) => write!(f, "unexpected end of data at {} bytes", len),
            Error::Sink(msg) => write!(f, "sink error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<&Error> for ErrorCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Io(_) => ErrorCode::FileIo,
            Error::InvalidFormat(_) => ErrorCode::InvalidFileType,
            Error::CorruptFile(_) => ErrorCode::CorruptFile,
            Error::NotOpen => ErrorCode::NotOpen,
            Error::AlreadyOpen => ErrorCode::AlreadyInitialized,
            Error::NotInitialized => ErrorCode::NotInitialized,
            Error::InvalidArgument(_) | Error::Config(_) => ErrorCode::InvalidArguments,
            Error::Eof => ErrorCode::Eof,
            Error::SensorNotFound(_) => ErrorCode::SensorNotFound,
            Error::InvalidPacket(_) | Error::UnexpectedEnd(_) => ErrorCode::Communication,
            Error::Sink(_) => ErrorCode::Generic,
        }
    }
}

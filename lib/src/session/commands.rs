//! Control messages sent by the session.

use crate::errors::EncodeError;
use crate::messages::{ControlItemCode, MessageType, encode_control};

/// IQ output sample rate of 100 kHz.
pub const SAMPLE_RATE_100KHZ: [u8; 5] = [0xA0, 0x86, 0x01, 0x00, 0x00];
/// Automatic RF filter selection.
pub const RF_FILTER_AUTO: [u8; 2] = [0x00, 0x00];
pub const AD_MODES: [u8; 2] = [0x00, 0x03];
/// Start complex IQ streaming in 16 bit FIFO capture mode, one block.
pub const RECEIVER_START: [u8; 4] = [0x80, 0x02, 0x01, 0x01];
pub const RECEIVER_STOP: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// Frequencies are sent as 40 bit little-endian integers.
const FREQUENCY_LENGTH: usize = 5;

fn set(item_code: ControlItemCode, parameters: &[u8]) -> Result<Vec<u8>, EncodeError> {
    encode_control(MessageType::SetControlItem, item_code, parameters)
}

/// The three messages sent right after the control channel opens, in order.
pub fn setup_sequence() -> Result<[Vec<u8>; 3], EncodeError> {
    Ok([
        set(ControlItemCode::IQOutputDataSampleRate, &SAMPLE_RATE_100KHZ)?,
        set(ControlItemCode::RFFilter, &RF_FILTER_AUTO)?,
        set(ControlItemCode::ADModes, &AD_MODES)?,
    ])
}

pub fn receiver_start() -> Result<Vec<u8>, EncodeError> {
    set(ControlItemCode::ReceiverState, &RECEIVER_START)
}

pub fn receiver_stop() -> Result<Vec<u8>, EncodeError> {
    set(ControlItemCode::ReceiverState, &RECEIVER_STOP)
}

pub fn frequency(hz: u64, channel: u8) -> Result<Vec<u8>, EncodeError> {
    let mut parameters = Vec::with_capacity(1 + FREQUENCY_LENGTH);
    parameters.push(channel);
    parameters.extend_from_slice(&hz.to_le_bytes()[..FREQUENCY_LENGTH]);
    set(ControlItemCode::ReceiverFrequency, &parameters)
}

pub fn gain(channel: u8, gain: u8) -> Result<Vec<u8>, EncodeError> {
    set(ControlItemCode::ManualGain, &[channel, gain])
}

pub fn bandwidth(channel: u8, bandwidth_hz: u32) -> Result<Vec<u8>, EncodeError> {
    let mut parameters = Vec::with_capacity(5);
    parameters.push(channel);
    parameters.extend_from_slice(&bandwidth_hz.to_le_bytes());
    set(ControlItemCode::IQOutputDataSampleRate, &parameters)
}

pub fn device_status() -> Result<Vec<u8>, EncodeError> {
    encode_control(MessageType::CurrentControlItem, ControlItemCode::DeviceStatus, &[])
}

pub fn calibrate() -> Result<Vec<u8>, EncodeError> {
    set(ControlItemCode::Calibration, &[])
}

pub fn reset() -> Result<Vec<u8>, EncodeError> {
    set(ControlItemCode::Reset, &[])
}

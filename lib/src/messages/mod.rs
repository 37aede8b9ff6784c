//! NetSDR Messages
//! ---------------
//!
//! Every message exchanged with the receiver starts with a 16 bit little-endian
//! header word. The upper three bits carry the message type, the lower thirteen
//! bits the total length of the message, header included.
//!
//! Control messages follow the header with a 2 byte item code and the item
//! parameters. Data messages follow it with a 2 byte sequence number and the
//! sample payload. A data message of exactly 8194 bytes does not fit the length
//! field and is sent with a length of 0 instead.
//!
//! ```text
//! | type:3 | length:13 | item code / sequence number:16 | parameters / payload ... |
//! ```

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use crate::errors::{DecodeError, EncodeError};

pub mod samples;

pub use samples::{Samples, extract_samples};

pub const MAX_MESSAGE_LENGTH: usize = 8191;
pub const MAX_DATA_ITEM_MESSAGE_LENGTH: usize = 8194;
pub const HEADER_LENGTH: usize = 2;
pub const ITEM_CODE_LENGTH: usize = 2;
pub const SEQUENCE_NUMBER_LENGTH: usize = 2;

const TYPE_SHIFT: u16 = 13;
const LENGTH_MASK: u16 = 0x1FFF;

/// Message type tag, stored in the three most significant header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MessageType {
    SetControlItem = 0,
    CurrentControlItem = 1,
    ControlItemRange = 2,
    Ack = 3,
    DataItem0 = 4,
    DataItem1 = 5,
    DataItem2 = 6,
    DataItem3 = 7,
    /// Does not fit the 3 bit type field; encodes onto the bits of `SetControlItem`.
    GetControlItem = 8,
}

impl MessageType {
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        use MessageType::*;
        match ordinal {
            0 => Some(SetControlItem),
            1 => Some(CurrentControlItem),
            2 => Some(ControlItemRange),
            3 => Some(Ack),
            4 => Some(DataItem0),
            5 => Some(DataItem1),
            6 => Some(DataItem2),
            7 => Some(DataItem3),
            8 => Some(GetControlItem),
            _ => None,
        }
    }

    /// Data kinds carry a sequence number where control kinds carry an item code.
    pub fn is_data(self) -> bool {
        matches!(
            self,
            MessageType::DataItem0 | MessageType::DataItem1 | MessageType::DataItem2 | MessageType::DataItem3
        )
    }
}

/// Hardware parameter addressed by a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlItemCode {
    /// No item code field present (data messages).
    None = 0x0000,
    IQOutputDataSampleRate = 0x00B8,
    RFFilter = 0x0044,
    ADModes = 0x008A,
    ReceiverState = 0x0018,
    ReceiverFrequency = 0x0020,
    ManualGain = 0x00B9,
    DeviceStatus = 0x00BA,
    Calibration = 0x00BB,
    Reset = 0x00BC,
}

impl ControlItemCode {
    pub fn value(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for ControlItemCode {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use ControlItemCode::*;
        match value {
            0x0000 => Ok(None),
            0x00B8 => Ok(IQOutputDataSampleRate),
            0x0044 => Ok(RFFilter),
            0x008A => Ok(ADModes),
            0x0018 => Ok(ReceiverState),
            0x0020 => Ok(ReceiverFrequency),
            0x00B9 => Ok(ManualGain),
            0x00BA => Ok(DeviceStatus),
            0x00BB => Ok(Calibration),
            0x00BC => Ok(Reset),
            other => Err(DecodeError::UnknownItemCode(other)),
        }
    }
}

/// A decoded message, borrowing its body from the received buffer.
///
/// Control messages report a `sequence_number` of 0, data messages report
/// [`ControlItemCode::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<'a> {
    pub message_type: MessageType,
    pub item_code: ControlItemCode,
    pub sequence_number: u16,
    pub body: &'a [u8],
}

/// Builds a control message: header, item code (unless `None`) and parameters.
///
/// # Errors
/// Returns [`EncodeError::LengthOverflow`] if the message would exceed 8191 bytes.
pub fn encode_control(
    message_type: MessageType,
    item_code: ControlItemCode,
    parameters: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    encode(message_type, item_code, parameters)
}

/// Builds a data message: header followed by `parameters`, which are expected
/// to start with their own 2 byte sequence number.
///
/// # Errors
/// Returns [`EncodeError::LengthOverflow`] if the message exceeds the allowed length.
pub fn encode_data(message_type: MessageType, parameters: &[u8]) -> Result<Vec<u8>, EncodeError> {
    encode(message_type, ControlItemCode::None, parameters)
}

/// Builds a data message from a sequence number and a sample payload.
pub fn encode_data_item(message_type: MessageType, sequence_number: u16, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let mut parameters = Vec::with_capacity(SEQUENCE_NUMBER_LENGTH + payload.len());
    parameters.extend_from_slice(&sequence_number.to_le_bytes());
    parameters.extend_from_slice(payload);
    encode_data(message_type, &parameters)
}

fn encode(message_type: MessageType, item_code: ControlItemCode, parameters: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let code_length = if item_code == ControlItemCode::None { 0 } else { ITEM_CODE_LENGTH };
    let header = header_word(message_type, code_length + parameters.len())?;

    let mut msg = Vec::with_capacity(HEADER_LENGTH + code_length + parameters.len());
    msg.extend_from_slice(&header.to_le_bytes());
    if code_length > 0 {
        msg.extend_from_slice(&item_code.value().to_le_bytes());
    }
    msg.extend_from_slice(parameters);
    trace!("Encoded {message_type:?} ({item_code:?}) into {} bytes", msg.len());
    Ok(msg)
}

fn header_word(message_type: MessageType, content_length: usize) -> Result<u16, EncodeError> {
    let length = content_length + HEADER_LENGTH;
    let mut length_field = length;
    if message_type.is_data() && length == MAX_DATA_ITEM_MESSAGE_LENGTH {
        length_field = 0;
    }
    if length_field > MAX_MESSAGE_LENGTH {
        return Err(EncodeError::LengthOverflow { length });
    }
    // Truncated to 16 bits: an ordinal of 8 spills out of the word.
    Ok((length_field as u32 | (u32::from(message_type.ordinal()) << TYPE_SHIFT)) as u16)
}

/// Splits a header word into its type and the total message length it declares.
fn split_header(word: u16) -> (MessageType, usize) {
    use MessageType::*;
    // Only three bits remain after the shift.
    let message_type = match word >> TYPE_SHIFT {
        0 => SetControlItem,
        1 => CurrentControlItem,
        2 => ControlItemRange,
        3 => Ack,
        4 => DataItem0,
        5 => DataItem1,
        6 => DataItem2,
        _ => DataItem3,
    };
    let mut length = (word & LENGTH_MASK) as usize;
    if message_type.is_data() && length == 0 {
        length = MAX_DATA_ITEM_MESSAGE_LENGTH;
    }
    (message_type, length)
}

/// Total length of the message announced by `header`, header included.
///
/// Used to cut messages out of the control byte stream.
pub fn frame_length(header: [u8; HEADER_LENGTH]) -> usize {
    split_header(u16::from_le_bytes(header)).1
}

/// Parses a complete message.
///
/// # Errors
/// - [`DecodeError::Truncated`] if the buffer ends inside the header or the
///   item code / sequence number field.
/// - [`DecodeError::UnknownItemCode`] if a control message names an undefined item.
/// - [`DecodeError::BodyLengthMismatch`] if the body is not the length the header declares.
pub fn decode(bytes: &[u8]) -> Result<Message<'_>, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let word = cursor.read_u16::<LittleEndian>().map_err(|_| DecodeError::Truncated {
        expected: HEADER_LENGTH,
        actual: bytes.len(),
    })?;
    let (message_type, declared_length) = split_header(word);
    let mut remaining = declared_length as i32 - HEADER_LENGTH as i32;

    let field = cursor.read_u16::<LittleEndian>().map_err(|_| DecodeError::Truncated {
        expected: HEADER_LENGTH + ITEM_CODE_LENGTH,
        actual: bytes.len(),
    })?;
    let (item_code, sequence_number) = if message_type.is_data() {
        remaining -= SEQUENCE_NUMBER_LENGTH as i32;
        (ControlItemCode::None, field)
    } else {
        remaining -= ITEM_CODE_LENGTH as i32;
        (ControlItemCode::try_from(field)?, 0)
    };

    let body = &bytes[cursor.position() as usize..];
    if body.len() as i32 != remaining {
        return Err(DecodeError::BodyLengthMismatch {
            expected: remaining,
            actual: body.len(),
        });
    }

    Ok(Message {
        message_type,
        item_code,
        sequence_number,
        body,
    })
}

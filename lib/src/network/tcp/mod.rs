use std::time::Duration;

use log::{error, info, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::NetworkError;
use crate::messages::{self, HEADER_LENGTH};

pub mod client;

/// Largest frame the control channel can carry.
pub const MAX_MESSAGE_LENGTH: usize = messages::MAX_DATA_ITEM_MESSAGE_LENGTH;
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads exactly one message from the stream into `buffer`, using the length
/// announced by its header.
///
/// Returns `Ok(None)` when the peer closed the stream between messages.
///
/// # Errors
/// - [`NetworkError::Protocol`] if the header announces an impossible length.
/// - [`NetworkError::Closed`] if the stream ends inside a message.
pub async fn read_message<R>(read_stream: &mut R, buffer: &mut [u8]) -> Result<Option<usize>, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LENGTH];
    match read_stream.read_exact(&mut header).await {
        Ok(_) => trace!("Header bytes: {header:02X?}"),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            info!("Stream closed by peer.");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    let msg_length = messages::frame_length(header);
    if msg_length < HEADER_LENGTH || msg_length > buffer.len() {
        error!("Header announces a message of length {msg_length}, buffer holds {}", buffer.len());
        return Err(NetworkError::Protocol(format!("invalid message length {msg_length}")));
    }

    buffer[..HEADER_LENGTH].copy_from_slice(&header);
    match read_stream.read_exact(&mut buffer[HEADER_LENGTH..msg_length]).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            error!("Stream closed before all {msg_length} bytes were read");
            return Err(NetworkError::Closed);
        }
        Err(e) => return Err(e.into()),
    }
    trace!("Read message of size {msg_length}");
    Ok(Some(msg_length))
}

/// Writes one encoded message and flushes it.
pub async fn send_message<W>(stream: &mut W, bytes: &[u8]) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ControlItemCode, MessageType, encode_control, encode_data};

    #[tokio::test]
    async fn test_reads_one_frame_at_a_time() {
        let first = encode_control(MessageType::Ack, ControlItemCode::ReceiverState, &[1, 2]).unwrap();
        let second = encode_control(MessageType::CurrentControlItem, ControlItemCode::DeviceStatus, &[]).unwrap();
        let stream_bytes = [first.clone(), second.clone()].concat();

        let mut stream = stream_bytes.as_slice();
        let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];

        let length = read_message(&mut stream, &mut buffer).await.unwrap().unwrap();
        assert_eq!(&buffer[..length], first.as_slice());
        let length = read_message(&mut stream, &mut buffer).await.unwrap().unwrap();
        assert_eq!(&buffer[..length], second.as_slice());
        assert!(read_message(&mut stream, &mut buffer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reads_wrapped_data_frame() {
        let frame = encode_data(MessageType::DataItem0, &vec![7u8; 8192]).unwrap();
        let mut stream = frame.as_slice();
        let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];

        assert_eq!(read_message(&mut stream, &mut buffer).await.unwrap(), Some(8194));
    }

    #[tokio::test]
    async fn test_rejects_zero_length_control_header() {
        let mut stream: &[u8] = &[0x00, 0x00, 0x18, 0x00];
        let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];

        assert!(matches!(
            read_message(&mut stream, &mut buffer).await,
            Err(NetworkError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_ends_inside_message() {
        let frame = encode_control(MessageType::Ack, ControlItemCode::ReceiverState, &[1, 2, 3]).unwrap();
        let mut stream = &frame[..frame.len() - 1];
        let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];

        assert!(matches!(read_message(&mut stream, &mut buffer).await, Err(NetworkError::Closed)));
    }
}

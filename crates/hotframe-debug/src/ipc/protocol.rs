//! Wire protocol: a little-endian `u32` length followed by a bincode payload.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::events::OverlaySnapshot;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest accepted payload.
pub const MAX_MESSAGE_LEN: usize = 4 * 1024 * 1024;

/// Message from host to monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Protocol version handshake.
    Hello { version: u8 },
    /// Latest overlay data.
    Snapshot(OverlaySnapshot),
    /// Host is shutting down.
    Goodbye,
}

/// Message from monitor to host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request protocol version.
    Hello,
    /// Clear the counter history.
    Reset,
    /// Monitor disconnecting.
    Goodbye,
}

/// Encode a message to bytes with length prefix.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, bincode::Error> {
    let data = bincode::serialize(msg)?;
    let len = u32::try_from(data.len())
        .map_err(|_| Box::new(bincode::ErrorKind::SizeLimit))?;
    let mut result = Vec::with_capacity(4 + data.len());
    result.extend_from_slice(&len.to_le_bytes());
    result.extend(data);
    Ok(result)
}

/// Decode a message from bytes (without length prefix).
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(data)
}

/// Read one length-prefixed payload.
///
/// Payloads larger than [`MAX_MESSAGE_LEN`] are rejected with
/// `InvalidData`; `WouldBlock` and `TimedOut` pass through unchanged.
pub fn read_frame(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message of {len} bytes exceeds limit"),
        ));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_server_message() {
        let msg = ServerMessage::Hello {
            version: PROTOCOL_VERSION,
        };
        let encoded = encode(&msg).unwrap();
        let len = u32::from_le_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(len as usize, encoded.len() - 4);

        let payload = read_frame(&mut encoded.as_slice()).unwrap();
        match decode::<ServerMessage>(&payload).unwrap() {
            ServerMessage::Hello { version } => assert_eq!(version, PROTOCOL_VERSION),
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn snapshot_message_keeps_rows() {
        let snapshot = OverlaySnapshot {
            frame_number: 9,
            reload_count: 1,
            ..OverlaySnapshot::default()
        };
        let encoded = encode(&ServerMessage::Snapshot(snapshot)).unwrap();
        let payload = read_frame(&mut encoded.as_slice()).unwrap();

        let ServerMessage::Snapshot(decoded) = decode(&payload).unwrap() else {
            panic!("expected snapshot");
        };
        assert_eq!(decoded.frame_number, 9);
        assert_eq!(decoded.reload_count, 1);
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut bytes = (MAX_MESSAGE_LEN as u32 + 1).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 8]);
        let err = read_frame(&mut bytes.as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_frame_is_eof() {
        let encoded = encode(&ClientMessage::Reset).unwrap();
        let err = read_frame(&mut &encoded[..encoded.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::crc::{checksum, ChecksumOrder};
use crate::error::{FrameError, Result};
use crate::function::{self, ExceptionCode};

/// Broadcast address: every slave acts, none replies.
pub const BROADCAST: u8 = 0;

/// Highest unicast node address.
pub const MAX_UNICAST: u8 = 247;

/// Checksum trailer size.
pub const CHECKSUM_SIZE: usize = 2;

/// Total frame budget on the wire.
pub const MAX_FRAME: usize = 256;

/// Largest function payload: frame budget minus address and checksum.
pub const MAX_PDU: usize = MAX_FRAME - 1 - CHECKSUM_SIZE;

/// Smallest decodable frame: address + function + checksum.
pub const MIN_FRAME: usize = 1 + 1 + CHECKSUM_SIZE;

/// A decoded request or response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination (requests) or source (responses) node address.
    pub address: u8,
    /// Function code followed by function data.
    pub pdu: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(address: u8, pdu: impl Into<Bytes>) -> Self {
        Self {
            address,
            pdu: pdu.into(),
        }
    }

    /// Function code. Zero only for a frame built with an empty payload.
    pub fn function(&self) -> u8 {
        self.pdu.first().copied().unwrap_or(0)
    }

    /// Function data following the function code.
    pub fn data(&self) -> &[u8] {
        self.pdu.get(1..).unwrap_or(&[])
    }

    pub fn is_broadcast(&self) -> bool {
        self.address == BROADCAST
    }

    pub fn is_exception(&self) -> bool {
        function::is_exception(self.function())
    }

    /// Exception code, if this is an exception reply.
    pub fn exception(&self) -> Option<ExceptionCode> {
        if self.is_exception() {
            self.data().first().map(|&code| ExceptionCode::from(code))
        } else {
            None
        }
    }

    /// The total wire size of this frame (address + payload + checksum).
    pub fn wire_size(&self) -> usize {
        1 + self.pdu.len() + CHECKSUM_SIZE
    }
}

/// Reject addresses outside the broadcast/unicast range.
pub fn validate_address(address: u8) -> Result<()> {
    if address > MAX_UNICAST {
        return Err(FrameError::InvalidAddress(address));
    }
    Ok(())
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌───────────┬───────────┬──────────────────┬────────────┐
/// │ Address   │ Function  │ Data             │ CRC16      │
/// │ (1B)      │ (1B)      │ (0-252B)         │ (2B)       │
/// └───────────┴───────────┴──────────────────┴────────────┘
/// ```
/// The checksum covers address, function and data.
pub fn encode_frame(address: u8, pdu: &[u8], order: ChecksumOrder, dst: &mut BytesMut) -> Result<()> {
    validate_address(address)?;
    if pdu.is_empty() {
        return Err(FrameError::EmptyPdu);
    }
    if pdu.len() > MAX_PDU {
        return Err(FrameError::PduTooLarge {
            size: pdu.len(),
            max: MAX_PDU,
        });
    }

    let start = dst.len();
    dst.reserve(1 + pdu.len() + CHECKSUM_SIZE);
    dst.put_u8(address);
    dst.put_slice(pdu);
    let crc = checksum(&dst[start..]);
    dst.put_slice(&order.to_wire(crc));
    Ok(())
}

/// Decode one complete frame from the bytes collected between two silences.
///
/// Line noise can leave a single spurious byte ahead of a real frame, so the
/// checksum is tried with the frame starting at offset 0 and then at offset 1.
/// The first offset that validates wins.
pub fn decode_frame(raw: &[u8], order: ChecksumOrder) -> Result<Frame> {
    if raw.len() < MIN_FRAME {
        return Err(FrameError::TooShort { len: raw.len() });
    }

    let candidate = [0usize, 1]
        .into_iter()
        .filter_map(|offset| raw.get(offset..))
        .find(|bytes| bytes.len() >= MIN_FRAME && order.verify(bytes))
        .ok_or(FrameError::ChecksumMismatch { len: raw.len() })?;

    if candidate.len() < raw.len() {
        trace!("dropped one leading noise byte");
    }

    let address = candidate[0];
    validate_address(address)?;
    let pdu = &candidate[1..candidate.len() - CHECKSUM_SIZE];
    if pdu.len() > MAX_PDU {
        return Err(FrameError::PduTooLarge {
            size: pdu.len(),
            max: MAX_PDU,
        });
    }

    Ok(Frame::new(address, Bytes::copy_from_slice(pdu)))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Wire order of the checksum bytes. Default: low byte first.
    pub checksum_order: ChecksumOrder,
}

impl FrameConfig {
    /// Encode into a fresh buffer.
    pub fn encode(&self, address: u8, pdu: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(1 + pdu.len() + CHECKSUM_SIZE);
        encode_frame(address, pdu, self.checksum_order, &mut buf)?;
        Ok(buf.freeze())
    }

    pub fn decode(&self, raw: &[u8]) -> Result<Frame> {
        decode_frame(raw, self.checksum_order)
    }
}

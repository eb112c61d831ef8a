//! Holding-register bank used as the slave side of `simulate` and `slave`.

use rtuprims_engine::{ExceptionCode, Frame, Responder};
use rtuprims_frame::function::{
    READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS, WRITE_MULTIPLE_REGISTERS, WRITE_SINGLE_REGISTER,
};
use tracing::{debug, warn};

/// Most registers one read may return (250 data bytes).
const MAX_READ: u16 = 125;
/// Most registers one write may carry.
const MAX_WRITE: u16 = 123;

#[derive(Debug, Clone)]
pub struct RegisterBank {
    registers: Vec<u16>,
}

impl RegisterBank {
    /// A bank of `size` registers, register N holding N.
    pub fn new(size: u16) -> Self {
        Self {
            registers: (0..size).collect(),
        }
    }

    /// Request handler body: apply the request and answer it.
    pub fn serve(&mut self, frame: &Frame, responder: &mut Responder<'_, '_>) {
        let result = self.apply(&frame.pdu);
        debug!(function = frame.function(), ok = result.is_ok(), "request applied");
        let sent = match result {
            Ok(reply) => responder.respond(&reply),
            Err(code) => responder.respond_error(frame.function(), code),
        };
        if let Err(err) = sent {
            warn!(error = %err, "reply not sent");
        }
    }

    /// Execute one request payload, returning the reply payload.
    pub fn apply(&mut self, pdu: &[u8]) -> Result<Vec<u8>, ExceptionCode> {
        let (&function, data) = pdu.split_first().ok_or(ExceptionCode::IllegalFunction)?;
        match function {
            READ_HOLDING_REGISTERS | READ_INPUT_REGISTERS => {
                let [start, count] = words::<2>(data)?;
                if count == 0 || count > MAX_READ {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let values = self.range(start, count)?;
                let mut reply = Vec::with_capacity(2 + values.len() * 2);
                reply.push(function);
                reply.push((values.len() * 2) as u8);
                reply.extend(values.iter().flat_map(|value| value.to_be_bytes()));
                Ok(reply)
            }
            WRITE_SINGLE_REGISTER => {
                let [address, value] = words::<2>(data)?;
                self.range_mut(address, 1)?[0] = value;
                Ok(pdu.to_vec())
            }
            WRITE_MULTIPLE_REGISTERS => {
                let (header, payload) = data.split_at_checked(5).ok_or(ExceptionCode::IllegalDataValue)?;
                let [start, count] = words::<2>(&header[..4])?;
                let byte_count = usize::from(header[4]);
                if count == 0
                    || count > MAX_WRITE
                    || byte_count != usize::from(count) * 2
                    || payload.len() != byte_count
                {
                    return Err(ExceptionCode::IllegalDataValue);
                }
                let target = self.range_mut(start, count)?;
                for (slot, chunk) in target.iter_mut().zip(payload.chunks_exact(2)) {
                    *slot = u16::from_be_bytes([chunk[0], chunk[1]]);
                }
                let mut reply = vec![function];
                reply.extend_from_slice(&header[..4]);
                Ok(reply)
            }
            _ => Err(ExceptionCode::IllegalFunction),
        }
    }

    fn range(&self, start: u16, count: u16) -> Result<&[u16], ExceptionCode> {
        let start = usize::from(start);
        self.registers
            .get(start..start + usize::from(count))
            .ok_or(ExceptionCode::IllegalDataAddress)
    }

    fn range_mut(&mut self, start: u16, count: u16) -> Result<&mut [u16], ExceptionCode> {
        let start = usize::from(start);
        self.registers
            .get_mut(start..start + usize::from(count))
            .ok_or(ExceptionCode::IllegalDataAddress)
    }
}

/// Split exactly `N` big-endian words off `data`.
fn words<const N: usize>(data: &[u8]) -> Result<[u16; N], ExceptionCode> {
    if data.len() != N * 2 {
        return Err(ExceptionCode::IllegalDataValue);
    }
    let mut out = [0u16; N];
    for (word, chunk) in out.iter_mut().zip(data.chunks_exact(2)) {
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    Ok(out)
}

/// Request payload for the register functions the bank understands.
pub fn build_request(function: u8, start: u16, count: u16, value: u16) -> Vec<u8> {
    let mut pdu = vec![function];
    match function {
        WRITE_SINGLE_REGISTER => {
            pdu.extend(start.to_be_bytes());
            pdu.extend(value.to_be_bytes());
        }
        WRITE_MULTIPLE_REGISTERS => {
            pdu.extend(start.to_be_bytes());
            pdu.extend(count.to_be_bytes());
            pdu.push((count.saturating_mul(2)).min(255) as u8);
            for _ in 0..count {
                pdu.extend(value.to_be_bytes());
            }
        }
        _ => {
            pdu.extend(start.to_be_bytes());
            pdu.extend(count.to_be_bytes());
        }
    }
    pdu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_register_values() {
        let mut bank = RegisterBank::new(8);
        let reply = bank.apply(&build_request(READ_HOLDING_REGISTERS, 2, 3, 0)).unwrap();
        assert_eq!(reply, vec![0x03, 6, 0, 2, 0, 3, 0, 4]);
    }

    #[test]
    fn writes_are_visible_to_later_reads() {
        let mut bank = RegisterBank::new(8);
        let request = build_request(WRITE_SINGLE_REGISTER, 1, 0, 0xBEEF);
        assert_eq!(bank.apply(&request).unwrap(), request);

        let request = build_request(WRITE_MULTIPLE_REGISTERS, 4, 2, 7);
        assert_eq!(bank.apply(&request).unwrap(), vec![0x10, 0, 4, 0, 2]);

        let reply = bank.apply(&build_request(READ_INPUT_REGISTERS, 0, 6, 0)).unwrap();
        assert_eq!(&reply[2..], &[0, 0, 0xBE, 0xEF, 0, 2, 0, 3, 0, 7, 0, 7]);
    }

    #[test]
    fn bad_requests_map_to_exceptions() {
        let mut bank = RegisterBank::new(4);
        assert_eq!(
            bank.apply(&build_request(READ_HOLDING_REGISTERS, 3, 2, 0)),
            Err(ExceptionCode::IllegalDataAddress)
        );
        assert_eq!(
            bank.apply(&build_request(READ_HOLDING_REGISTERS, 0, 0, 0)),
            Err(ExceptionCode::IllegalDataValue)
        );
        assert_eq!(bank.apply(&[0x03, 0x00]), Err(ExceptionCode::IllegalDataValue));
        assert_eq!(bank.apply(&[0x2B]), Err(ExceptionCode::IllegalFunction));
    }
}

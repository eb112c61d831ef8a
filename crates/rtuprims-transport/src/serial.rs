//! Serial-port transport built on the `serialport` crate.
//!
//! A port is split into a [`SerialStream`] (handed to the engine) and a
//! [`SerialReader`] (kept by the polling loop). Writes are blocking and
//! complete before `send` returns, so the transmit-complete notification is
//! queued and surfaced on the reader's next poll.

use std::cell::Cell;
use std::io::{ErrorKind, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{ByteStream, StreamEvent, TransportId};

const READ_CHUNK_SIZE: usize = 256;

/// Open `path` at `baud` (8N1, no flow control) and split it into halves.
pub fn open_serial(path: &str, baud: u32, id: TransportId) -> Result<(SerialStream, SerialReader)> {
    let open_error = |err: serialport::Error| TransportError::Open {
        path: path.to_string(),
        message: err.to_string(),
    };
    let port = serialport::new(path, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(10))
        .open()
        .map_err(open_error)?;
    let reader_port = port.try_clone().map_err(open_error)?;
    info!(path, baud, transport = %id, "serial port opened");

    let completions = Rc::new(Cell::new(0usize));
    Ok((
        SerialStream {
            id,
            port,
            completions: completions.clone(),
        },
        SerialReader {
            id,
            port: reader_port,
            completions,
        },
    ))
}

/// Transmit half of a serial port.
pub struct SerialStream {
    id: TransportId,
    port: Box<dyn SerialPort>,
    completions: Rc<Cell<usize>>,
}

impl ByteStream for SerialStream {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        self.completions.set(self.completions.get() + 1);
        debug!(transport = %self.id, len = bytes.len(), "serial frame written");
        Ok(())
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream").field("id", &self.id).finish()
    }
}

/// Receive half of a serial port.
pub struct SerialReader {
    id: TransportId,
    port: Box<dyn SerialPort>,
    completions: Rc<Cell<usize>>,
}

impl SerialReader {
    /// Collect pending notifications, waiting at most `timeout` for input.
    pub fn poll(&mut self, timeout: Duration, out: &mut Vec<StreamEvent>) -> Result<()> {
        for _ in 0..self.completions.replace(0) {
            out.push(StreamEvent::TxComplete { transport: self.id });
        }

        self.port
            .set_timeout(timeout.max(Duration::from_millis(1)))
            .map_err(|err| std::io::Error::other(err.to_string()))?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.port.read(&mut chunk) {
            Ok(read) => {
                out.extend(chunk[..read].iter().map(|&byte| StreamEvent::Byte {
                    transport: self.id,
                    byte,
                }));
                Ok(())
            }
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                Ok(())
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl std::fmt::Debug for SerialReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialReader").field("id", &self.id).finish()
    }
}

//! `serialport` backed modem link.
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, info};
use serialport::SerialPort;
use tokio::time::sleep;

use super::{ByteChannel, ModemError, Result};

/// Serial connection to the modem UART.
pub struct SerialModem {
    port_name: String,
    port: Box<dyn SerialPort>,
    rx: VecDeque<u8>,
}

impl SerialModem {
    /// Open `port_name`, pulse the reset line, wait for the modem to settle and discard its
    /// boot chatter.
    ///
    /// The reset pulse drives DTR low for `reset_pulse` (skipped when zero); most SIM800
    /// breakout boards wire DTR or a transistor on it to the modem RST pin.
    pub async fn open(
        port_name: &str,
        baud_rate: u32,
        reset_pulse: Duration,
        settle: Duration,
    ) -> Result<Self> {
        info!("Opening modem on {} at {} baud", port_name, baud_rate);
        let mut builder = serialport::new(port_name, baud_rate).timeout(Duration::from_millis(50));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let mut port = builder.open()?;

        if !reset_pulse.is_zero() {
            debug!("Pulsing modem reset for {:?}", reset_pulse);
            port.write_data_terminal_ready(false)?;
            sleep(reset_pulse).await;
            port.write_data_terminal_ready(true)?;
        }
        sleep(settle).await;

        let mut modem = SerialModem {
            port_name: port_name.to_string(),
            port,
            rx: VecDeque::with_capacity(256),
        };
        let dropped = modem.discard_input()?;
        debug!("Serial port ready, discarded {} startup bytes", dropped);
        Ok(modem)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn fill(&mut self) -> Result<()> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(());
        }
        let mut chunk = [0u8; 256];
        let want = available.min(chunk.len());
        match self.port.read(&mut chunk[..want]) {
            Ok(n) => {
                self.rx.extend(&chunk[..n]);
                Ok(())
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::Interrupted =>
            {
                Ok(())
            }
            Err(e) => Err(ModemError::Io(e)),
        }
    }
}

impl ByteChannel for SerialModem {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.rx.is_empty() {
            self.fill()?;
        }
        Ok(self.rx.pop_front())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<usize> {
        let mut dropped = self.rx.len();
        self.rx.clear();
        dropped += self.port.bytes_to_read()? as usize;
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(dropped)
    }
}

//! Native K-line bridge backed by the `serialport` crate.
//!
//! Plain USB-UART bridges have no bit-bang engine, so the wakeup waveform is
//! produced with the serial break signal instead: holding break pulls the TX
//! line low exactly like driving a bit-bang zero, and releasing it restores
//! the idle-high line. The pulse widths the engine sleeps between level
//! changes are what the ECU actually times, so the two techniques are
//! interchangeable on the wire.

use {
    crate::{
        error::{Error, Result},
        port::{KlineBridge, SerialConfig},
    },
    log::trace,
    serialport::ClearBuffer,
    std::{
        io::{Read, Write},
        thread,
        time::{Duration, Instant},
    },
};

/// How long the presence test waits for the pulse echo.
const PRESENCE_DEADLINE: Duration = Duration::from_secs(1);

/// Settle time between presence pulses.
const PRESENCE_POLL: Duration = Duration::from_millis(2);

/// Native serial port bridge.
pub struct NativeBridge {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    bitbang: bool,
}

impl NativeBridge {
    /// Open a K-line bridge with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            port,
            name: config.port_name.clone(),
            bitbang: false,
        })
    }

    /// Open a K-line bridge on `port_name` at the standard 10400 baud.
    pub fn open_simple(port_name: &str) -> Result<Self> {
        Self::open(&SerialConfig::new(port_name))
    }

    /// Get the port name/path.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl KlineBridge for NativeBridge {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.bitbang {
            // Line-level writes: the last bit decides where the line rests.
            match bytes.last() {
                Some(0x00) => self.port.set_break()?,
                Some(_) => self.port.clear_break()?,
                None => {}
            }
            return Ok(());
        }
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_available(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        match self.port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn purge_buffers(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn set_bit_mode(&mut self, _mask: u8, mode: u8) -> Result<()> {
        trace!("bit mode {mode:#04x}");
        self.bitbang = mode != 0;
        if !self.bitbang {
            self.port.clear_break()?;
        }
        Ok(())
    }

    fn presence_test(&mut self) -> Result<bool> {
        let mut detected = false;
        self.purge_buffers()?;
        let start = Instant::now();
        while start.elapsed() < PRESENCE_DEADLINE {
            self.port.write_all(&[0xFF])?;
            self.port.flush()?;
            thread::sleep(PRESENCE_POLL);
            let echo = self.read_available(1)?;
            if let Some(&byte) = echo.first() {
                detected = byte == 0xFF;
                break;
            }
        }
        self.purge_buffers()?;
        trace!("presence test: {detected}");
        Ok(detected)
    }
}

//! WS2812 strip driven through the SPI MOSI line.
//!
//! Each data bit becomes three SPI bits at 2.4 MHz (`110` for one, `100` for zero),
//! which lands every symbol inside the strip's 1.25 µs bit window.

use crate::error::AppError;
use crate::fusion::Rgb;
use crate::led::{LedDriver, LedError, SegmentLayout};
use crate::sensor::SensorId;

#[cfg(target_os = "linux")]
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
#[cfg(target_os = "linux")]
use tracing::info;

pub const SPI_CLOCK_HZ: u32 = 2_400_000;
/// Low time after the last pixel; 24 bytes at 2.4 MHz is about 80 µs.
pub const RESET_BYTES: usize = 24;

const ONE_SYMBOL: u32 = 0b110;
const ZERO_SYMBOL: u32 = 0b100;

/// Encode pixels into the SPI byte stream, GRB order, followed by the reset gap.
pub fn encode_pixels(pixels: &[Rgb]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 9 + RESET_BYTES);
    for pixel in pixels {
        for channel in [pixel.1, pixel.0, pixel.2] {
            let mut bits: u32 = 0;
            for bit in (0..8).rev() {
                let symbol = if channel & (1 << bit) != 0 {
                    ONE_SYMBOL
                } else {
                    ZERO_SYMBOL
                };
                bits = (bits << 3) | symbol;
            }
            out.extend_from_slice(&bits.to_be_bytes()[1..]);
        }
    }
    out.resize(out.len() + RESET_BYTES, 0);
    out
}

/// Frame buffer shared by the SPI driver: one colour per pixel.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    layout: SegmentLayout,
    pixels: Vec<Rgb>,
}

impl PixelBuffer {
    pub fn new(layout: SegmentLayout) -> Result<Self, LedError> {
        layout.validate()?;
        let pixels = vec![Rgb::OFF; layout.pixel_count];
        Ok(Self { layout, pixels })
    }

    pub fn set_segment(&mut self, segment: SensorId, color: Rgb) {
        let range = self.layout.range(segment);
        for pixel in &mut self.pixels[range.start..range.end] {
            *pixel = color;
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Rgb::OFF);
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }
}

#[cfg(target_os = "linux")]
pub struct Ws2812Strip {
    spi: Spi,
    buffer: PixelBuffer,
}

#[cfg(target_os = "linux")]
impl Ws2812Strip {
    pub fn new(spi_bus: u8, layout: SegmentLayout) -> Result<Self, AppError> {
        let bus = match spi_bus {
            0 => Bus::Spi0,
            1 => Bus::Spi1,
            2 => Bus::Spi2,
            other => return Err(AppError::Spi(format!("unsupported SPI bus {other}"))),
        };
        let spi = Spi::new(bus, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|err| AppError::Spi(err.to_string()))?;
        let buffer = PixelBuffer::new(layout).map_err(|err| AppError::Led(err.to_string()))?;
        info!(spi_bus, pixels = buffer.pixels().len(), "LED strip initialized");
        Ok(Self { spi, buffer })
    }

    fn flush(&mut self) -> Result<(), LedError> {
        let frame = encode_pixels(self.buffer.pixels());
        self.spi
            .write(&frame)
            .map_err(|err| LedError::Spi(err.to_string()))?;
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl LedDriver for Ws2812Strip {
    fn set_segment(&mut self, segment: SensorId, color: Rgb, brightness: u8) -> Result<(), LedError> {
        self.buffer.set_segment(segment, color.scaled(brightness));
        Ok(())
    }

    fn show(&mut self) -> Result<(), LedError> {
        self.flush()
    }

    fn clear(&mut self) -> Result<(), LedError> {
        self.buffer.clear();
        self.flush()
    }
}

#[cfg(not(target_os = "linux"))]
pub struct Ws2812Strip;

#[cfg(not(target_os = "linux"))]
impl Ws2812Strip {
    pub fn new(_spi_bus: u8, _layout: SegmentLayout) -> Result<Self, AppError> {
        Err(AppError::Led(
            "WS2812 driver requires Linux/Raspberry Pi".to_string(),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl LedDriver for Ws2812Strip {
    fn set_segment(&mut self, _segment: SensorId, _color: Rgb, _brightness: u8) -> Result<(), LedError> {
        Err(LedError::Unavailable("requires Linux/Raspberry Pi".to_string()))
    }

    fn show(&mut self) -> Result<(), LedError> {
        Err(LedError::Unavailable("requires Linux/Raspberry Pi".to_string()))
    }

    fn clear(&mut self) -> Result<(), LedError> {
        Err(LedError::Unavailable("requires Linux/Raspberry Pi".to_string()))
    }
}

//! ESP32-S3 dev board support
//!
//! Maps the physical hardware to named subsystems so the rest of the
//! crate never needs GPIO numbers. Pin assignments live in [`pins`].
//! Peripheral construction needs esp-hal and sits behind the `esp32s3`
//! feature; the expander startup sequence is plain embedded-hal.

pub mod button;
pub mod pins;

pub use button::{Button, decode_port1};

use core::fmt;

use embedded_hal::digital::PinState;
use embedded_hal::i2c::I2c;

use crate::drivers::xl9555::{self, Direction, Xl9555};

// Startup state of the expander lines this firmware uses:
// KEY0..3 inputs, amplifier enable as output, buzzer line latched high.
pub fn init_expander<I2C, E>(xl: &mut Xl9555<I2C>) -> Result<(), xl9555::Error<E>>
where
    I2C: I2c<Error = E>,
    E: fmt::Debug,
{
    xl.init()?;
    xl.configure_pin_direction(
        pins::KEY0 | pins::KEY1 | pins::KEY2 | pins::KEY3,
        Direction::Input,
    )?;
    xl.configure_pin_direction(pins::SPK_EN, Direction::Output)?;
    xl.set_pin(pins::BEEP, PinState::High)?;
    Ok(())
}

#[cfg(feature = "esp32s3")]
pub use hw::*;

#[cfg(feature = "esp32s3")]
mod hw {
    use embedded_hal_bus::spi::ExclusiveDevice;
    use embedded_sdmmc::SdCard;
    use esp_hal::{
        Blocking,
        delay::Delay,
        gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
        i2c,
        peripherals::Peripherals,
        spi,
        time::Rate,
    };
    use log::{info, warn};

    use crate::drivers::sdcard::{SD_INIT_FREQ_HZ, SD_NORMAL_FREQ_HZ};
    use crate::drivers::xl9555::{I2C_FREQ_HZ, Xl9555};

    // Type Aliases
    pub type I2cBus = i2c::master::I2c<'static, Blocking>;
    pub type SpiBus = spi::master::Spi<'static, Blocking>;
    pub type SpiDevice = ExclusiveDevice<SpiBus, Output<'static>, Delay>;
    pub type SdCardDev = SdCard<SpiDevice, Delay>;
    pub type Expander = Xl9555<I2cBus>;

    /// Complete board hardware, ready for driver initialization.
    pub struct Board {
        // GPIO0: Boot key, also the expander INT line
        pub boot: Input<'static>,
        pub expander: Expander,
        pub sd: SdCardDev,
    }

    impl Board {
        pub fn init(p: Peripherals) -> Self {
            // pull-up keeps the open-drain INT line and the key idle high
            let boot = Input::new(p.GPIO0, InputConfig::default().with_pull(Pull::Up));

            info!("Initializing I2C bus...");
            let i2c_cfg = i2c::master::Config::default()
                .with_frequency(Rate::from_hz(I2C_FREQ_HZ));
            let i2c = i2c::master::I2c::new(p.I2C0, i2c_cfg)
                .unwrap()
                .with_sda(p.GPIO41)
                .with_scl(p.GPIO42);

            // SD card on SPI2, slow clock until the card is initialized
            let cs = Output::new(p.GPIO2, Level::High, OutputConfig::default());
            let spi_cfg =
                spi::master::Config::default().with_frequency(Rate::from_hz(SD_INIT_FREQ_HZ));
            let spi_bus = spi::master::Spi::new(p.SPI2, spi_cfg)
                .unwrap()
                .with_sck(p.GPIO12)
                .with_mosi(p.GPIO11)
                .with_miso(p.GPIO13);
            let spi_dev = ExclusiveDevice::new(spi_bus, cs, Delay::new()).unwrap();

            Board {
                boot,
                expander: Xl9555::new(i2c),
                sd: SdCard::new(spi_dev, Delay::new()),
            }
        }
    }

    // Raise the SD clock once the card has answered the init sequence.
    pub fn sd_full_speed(card: &SdCardDev) {
        let cfg = spi::master::Config::default().with_frequency(Rate::from_hz(SD_NORMAL_FREQ_HZ));
        if let Err(e) = card.spi(|dev| dev.bus_mut().apply_config(&cfg)) {
            warn!("SD: clock switch failed: {:?}", e);
        }
    }
}

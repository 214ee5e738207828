// SD card over SPI with FAT volume manager
// No RTC on board; timestamps are fixed to 2025-01-01.
//
// SdStorage works over any BlockDevice; on the board that is SdCard on
// SPI2. The manager is parked in an Option so raw directory-entry work
// (see fat.rs) can borrow the bare device and hand it back.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::sdcard::CardType;
use core::fmt;

use embedded_sdmmc::{
    BlockDevice, SdCard, SdCardError, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use log::{info, warn};

// sd card initialization frequency (Hz).
pub const SD_INIT_FREQ_HZ: u32 = 400_000;

// Normal operating frequency after init
pub const SD_NORMAL_FREQ_HZ: u32 = 20_000_000;

// card init and mount attempts after the first one fails
pub const MOUNT_RETRIES: u8 = 2;

pub const MAX_DIRS: usize = 4;
pub const MAX_FILES: usize = 4;
pub const MAX_VOLUMES: usize = 1;

pub type Manager<D> = VolumeManager<D, FixedTimeSource, MAX_DIRS, MAX_FILES, MAX_VOLUMES>;
pub type Volume<'a, D> =
    embedded_sdmmc::Volume<'a, D, FixedTimeSource, MAX_DIRS, MAX_FILES, MAX_VOLUMES>;
pub type Dir<'a, D> =
    embedded_sdmmc::Directory<'a, D, FixedTimeSource, MAX_DIRS, MAX_FILES, MAX_VOLUMES>;

#[derive(Default, Clone, Copy)]
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardKind {
    // v1 standard capacity
    Sdsc1,
    // v2 standard capacity
    Sdsc2,
    // high / extended capacity, block addressed
    Sdhc,
    Unknown,
}

impl CardKind {
    pub const fn name(self) -> &'static str {
        match self {
            CardKind::Sdsc1 | CardKind::Sdsc2 => "SDSC",
            CardKind::Sdhc => "SDHC",
            CardKind::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardInfo {
    pub kind: CardKind,
    pub bytes: u64,
}

impl CardInfo {
    pub fn size_mb(&self) -> u64 {
        self.bytes / (1024 * 1024)
    }
}

// Run `attempt` once, then up to `retries` more times while it fails.
pub fn retry<T, E, F>(what: &str, retries: u8, mut attempt: F) -> Result<T, E>
where
    E: fmt::Debug,
    F: FnMut() -> Result<T, E>,
{
    let mut n = 1u16;
    loop {
        match attempt() {
            Ok(v) => {
                if n > 1 {
                    info!("SD: {} succeeded on attempt {}", what, n);
                }
                return Ok(v);
            }
            Err(e) => {
                warn!("SD: {} attempt {} failed: {:?}", what, n, e);
                if n > u16::from(retries) {
                    return Err(e);
                }
            }
        }
        n += 1;
    }
}

// Probe the card before handing it to the volume manager.
// num_bytes() triggers the SD init sequence (CMD0, CMD8, ACMD41, ...);
// after a failure the next call starts the sequence over.
pub fn probe<SPI, DELAY>(card: &SdCard<SPI, DELAY>) -> Result<CardInfo, SdCardError>
where
    SPI: SpiDevice<u8>,
    DELAY: DelayNs,
{
    let bytes = card.num_bytes()?;
    let kind = match card.get_card_type() {
        Some(CardType::SD1) => CardKind::Sdsc1,
        Some(CardType::SD2) => CardKind::Sdsc2,
        Some(CardType::SDHC) => CardKind::Sdhc,
        None => CardKind::Unknown,
    };
    let info = CardInfo { kind, bytes };
    info!("SD Card Type: {}", info.kind.name());
    info!("SD Card Size: {}MB", info.size_mb());
    Ok(info)
}

// Card init with the same retry budget as the mount.
pub fn probe_with_retries<SPI, DELAY>(
    card: &SdCard<SPI, DELAY>,
    retries: u8,
) -> Result<CardInfo, SdCardError>
where
    SPI: SpiDevice<u8>,
    DELAY: DelayNs,
{
    retry("card init", retries, || probe(card))
}

pub struct SdStorage<D>
where
    D: BlockDevice,
{
    mgr: Option<Manager<D>>,
}

impl<D> SdStorage<D>
where
    D: BlockDevice,
{
    pub fn new(device: D) -> Self {
        Self {
            mgr: Some(VolumeManager::new(device, FixedTimeSource)),
        }
    }

    pub fn volume_mgr(&self) -> Result<&Manager<D>, &'static str> {
        self.mgr.as_ref().ok_or("storage busy")
    }

    // volume 0 stays open until the returned handle drops
    pub fn open_volume(&self) -> Result<Volume<'_, D>, &'static str> {
        self.volume_mgr()?.open_volume(VolumeIdx(0)).map_err(|e| {
            warn!("SD: open volume failed: {:?}", e);
            "open volume failed"
        })
    }

    // Open volume 0, retrying `retries` more times on failure.
    pub fn mount(&self, retries: u8) -> Result<(), &'static str> {
        let mgr = self.volume_mgr()?;
        match retry("mount", retries, || mgr.open_volume(VolumeIdx(0))) {
            Ok(_volume) => {
                info!("SD: volume mounted");
                Ok(())
            }
            Err(_) => {
                warn!("Card Mount Failed");
                Err("card mount failed")
            }
        }
    }

    // Run `f` on the bare block device. No volume, directory or file may
    // be open; the manager is rebuilt afterwards with empty caches.
    pub fn with_device<R, F>(&mut self, f: F) -> Result<R, &'static str>
    where
        F: FnOnce(&D) -> Result<R, &'static str>,
    {
        let mgr = self.mgr.take().ok_or("storage busy")?;
        let (device, time_source) = mgr.free();
        let result = f(&device);
        self.mgr = Some(VolumeManager::new(device, time_source));
        result
    }

    pub fn release(self) -> Option<D> {
        self.mgr.map(|mgr| mgr.free().0)
    }
}

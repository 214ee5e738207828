// hello-es8388 entry point
//
// Boot sequence: logger -> board -> XL9555 startup -> SD init/mount
// (each retried twice) -> one pass of the SD walkthrough.
// Main loop: poll keys every 10ms and log each event.
//
// A missing card or expander is logged and the firmware keeps running;
// keys still work off the Boot pin.

#![no_std]
#![no_main]

use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::time::Instant;
use log::{info, warn};

use hello_es8388::apps::sd_demo;
use hello_es8388::board::{self, Board};
use hello_es8388::drivers::input::InputDriver;
use hello_es8388::drivers::sdcard::{self, MOUNT_RETRIES, SdStorage};

esp_bootloader_esp_idf::esp_app_desc!();

const POLL_INTERVAL_MS: u32 = 10;

fn now_ms() -> u64 {
    Instant::now().duration_since_epoch().as_millis()
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("booting...");

    let Board {
        boot,
        mut expander,
        sd,
    } = Board::init(peripherals);
    info!("hardware initialized.");

    match board::init_expander(&mut expander) {
        Ok(()) => info!("xl9555 ready."),
        Err(e) => warn!("xl9555 init failed: {}", e),
    }

    match sdcard::probe_with_retries(&sd, MOUNT_RETRIES) {
        Ok(_) => {
            board::sd_full_speed(&sd);
            let mut storage = SdStorage::new(sd);
            if storage.mount(MOUNT_RETRIES).is_ok() {
                info!("SD card initialized.");
                sd_demo::run(&mut storage, now_ms);
            }
        }
        Err(e) => warn!("No SD card attached: {:?}", e),
    }

    let delay = Delay::new();
    let mut input = InputDriver::new(boot, now_ms());
    info!("polling keys.");

    loop {
        while let Some(event) = input.poll(&mut expander, now_ms()) {
            info!("key: {:?}", event);
        }
        delay.delay_millis(POLL_INTERVAL_MS);
    }
}

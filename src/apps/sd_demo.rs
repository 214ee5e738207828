// SD card walkthrough run once after mount, ending with the space report.
// Exercises every file helper in turn and keeps going past failures;
// each helper already logs what went wrong.

use embedded_sdmmc::BlockDevice;
use log::info;

use crate::drivers::fat::Usage;
use crate::drivers::sdcard::SdStorage;
use crate::drivers::storage::{self, IoBench};

pub struct DemoReport {
    // steps that returned an error
    pub failed: u8,
    pub bench: Option<IoBench>,
    pub space: Option<Usage>,
}

fn print_file<D: BlockDevice>(sd: &SdStorage<D>, path: &str) -> Result<usize, &'static str> {
    info!("{}:", path);
    storage::read_file(sd, path, |chunk| {
        info!("{}", core::str::from_utf8(chunk).unwrap_or("<binary>"))
    })
}

pub fn run<D, N>(sd: &mut SdStorage<D>, now_ms: N) -> DemoReport
where
    D: BlockDevice,
    N: FnMut() -> u64,
{
    run_with_bench_size(sd, storage::BENCH_WRITE_CHUNKS, now_ms)
}

pub fn run_with_bench_size<D, N>(
    sd: &mut SdStorage<D>,
    bench_chunks: usize,
    now_ms: N,
) -> DemoReport
where
    D: BlockDevice,
    N: FnMut() -> u64,
{
    let mut failed = 0u8;
    let mut check = |ok: bool| {
        if !ok {
            failed += 1;
        }
    };

    check(storage::write_file(sd, "/test.txt", b"testing 1, 2, 3.\n").is_ok());
    check(print_file(sd, "/test.txt").is_ok());

    check(storage::list_dir(sd, "/", 0, |_, _| {}).is_ok());
    check(storage::create_dir(sd, "/mydir").is_ok());
    check(storage::list_dir(sd, "/", 0, |_, _| {}).is_ok());
    check(storage::remove_dir(sd, "/mydir").is_ok());
    check(storage::list_dir(sd, "/", 2, |_, _| {}).is_ok());

    check(storage::write_file(sd, "/hello.txt", b"Hello ").is_ok());
    check(storage::append_file(sd, "/hello.txt", b"World!\n").is_ok());
    check(print_file(sd, "/hello.txt").is_ok());
    check(storage::delete_file(sd, "/foo.txt").is_ok());
    check(storage::rename_file(sd, "/hello.txt", "/foo.txt").is_ok());
    check(print_file(sd, "/foo.txt").is_ok());

    let bench = storage::test_file_io_chunks(sd, "/test.txt", bench_chunks, now_ms).ok();
    check(bench.is_some());
    let space = storage::space(sd).ok();
    check(space.is_some());

    info!("SD demo done, {} step(s) failed", failed);
    DemoReport {
        failed,
        bench,
        space,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::ramdisk::RamDisk;
    use std::vec::Vec;

    #[test]
    fn fresh_card_runs_every_step() {
        let mut sd = SdStorage::new(RamDisk::formatted());
        sd.mount(0).unwrap();

        let report = run_with_bench_size(&mut sd, 8, || 0);
        // only deleting the not-yet-existing /foo.txt fails
        assert_eq!(report.failed, 1);
        let bench = report.bench.unwrap();
        assert_eq!(bench.read_bytes, 17);
        assert_eq!(bench.written_bytes, 8 * 512);
        // at least /test.txt (8 clusters) and /foo.txt (1 cluster)
        let space = report.space.unwrap();
        assert!(space.used_bytes >= 9 * 512);
        assert!(space.used_bytes < space.total_bytes);

        let mut foo = Vec::new();
        storage::read_file(&sd, "/foo.txt", |c| foo.extend_from_slice(c)).unwrap();
        assert_eq!(foo, b"Hello World!\n");
        assert!(storage::file_size(&sd, "/hello.txt").is_err());
        assert!(storage::list_dir(&sd, "/mydir", 0, |_, _| {}).is_err());
    }

    #[test]
    fn second_run_replaces_foo() {
        let mut sd = SdStorage::new(RamDisk::formatted());
        sd.mount(0).unwrap();
        run_with_bench_size(&mut sd, 1, || 0);

        let report = run_with_bench_size(&mut sd, 1, || 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.bench.map(|b| b.read_bytes), Some(17));
    }

    #[test]
    fn unmountable_card_fails_every_step() {
        let mut sd = SdStorage::new(RamDisk::blank(16));
        let report = run_with_bench_size(&mut sd, 1, || 0);
        assert_eq!(report.failed, 15);
        assert!(report.bench.is_none());
        assert!(report.space.is_none());
    }
}

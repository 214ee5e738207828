// FAT file helpers over a mounted SdStorage.
// Paths are '/'-separated 8.3 components, e.g. "/MYDIR/HELLO.TXT".
// Each helper opens volume 0 for the duration of the call and logs what
// it does; failures are logged too and returned as short descriptions.
//
// Rename within one directory and rmdir edit the directory entry in
// place (fat.rs); moving a file to another directory copies it.

use embedded_sdmmc::{BlockDevice, Mode, ShortFileName};
use log::{info, warn};

use crate::drivers::fat;
use crate::drivers::sdcard::{Dir, SdStorage, Volume};

// transfer unit for reads, copies and the benchmark
pub const CHUNK: usize = 512;

// benchmark write size: 2048 x 512 = 1 MiB
pub const BENCH_WRITE_CHUNKS: usize = 2048;

#[derive(Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; 12],
    pub name_len: u8,
    pub is_dir: bool,
    pub size: u32,
}

impl DirEntry {
    pub const EMPTY: Self = Self {
        name: [0u8; 12],
        name_len: 0,
        is_dir: false,
        size: 0,
    };

    fn from_fat(entry: &embedded_sdmmc::DirEntry) -> Self {
        let mut name = [0u8; 12];
        let name_len = format_83_name(&entry.name, &mut name);
        Self {
            name,
            name_len: name_len as u8,
            is_dir: entry.attributes.is_directory(),
            size: entry.size,
        }
    }

    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoBench {
    pub read_bytes: u32,
    pub read_ms: u64,
    pub written_bytes: u32,
    pub write_ms: u64,
}

fn format_83_name(sfn: &ShortFileName, out: &mut [u8; 12]) -> usize {
    let base = sfn.base_name();
    let ext = sfn.extension();

    let mut pos = 0;

    for &b in base.iter().take(8) {
        if b == b' ' {
            break;
        }
        out[pos] = b;
        pos += 1;
    }

    let ext_trimmed: &[u8] = &ext[..ext.iter().position(|&b| b == b' ').unwrap_or(ext.len())];
    if !ext_trimmed.is_empty() {
        out[pos] = b'.';
        pos += 1;
        for &b in ext_trimmed.iter().take(3) {
            out[pos] = b;
            pos += 1;
        }
    }

    pos
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

// "/A/B/C.TXT" -> ("A/B", "C.TXT")
fn split_parent(path: &str) -> Result<(&str, &str), &'static str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err("path names no entry");
    }
    Ok(trimmed.rsplit_once('/').unwrap_or(("", trimmed)))
}

fn same_dir(a: &str, b: &str) -> bool {
    let mut a = components(a);
    let mut b = components(b);
    loop {
        match (a.next(), b.next()) {
            (None, None) => return true,
            (Some(x), Some(y)) if x.eq_ignore_ascii_case(y) => {}
            _ => return false,
        }
    }
}

fn is_dot_entry(entry: &embedded_sdmmc::DirEntry) -> bool {
    entry.name.base_name().first() == Some(&b'.')
}

// root, then change_dir down each component
fn open_path<'a, D>(volume: &'a Volume<'a, D>, path: &str) -> Result<Dir<'a, D>, &'static str>
where
    D: BlockDevice,
{
    let mut dir = volume.open_root_dir().map_err(|_| "open root dir failed")?;
    for name in components(path) {
        dir.change_dir(name).map_err(|_| "open dir failed")?;
    }
    Ok(dir)
}

// Directories below the listed path, innermost first; each link lives
// in the stack frame of its level of the walk.
struct Trail<'p> {
    entry: DirEntry,
    parent: Option<&'p Trail<'p>>,
}

fn descend<D>(dir: &mut Dir<'_, D>, trail: Option<&Trail<'_>>) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    if let Some(t) = trail {
        descend(dir, t.parent)?;
        dir.change_dir(t.entry.name_str()).map_err(|_| "open dir failed")?;
    }
    Ok(())
}

/// Walk `path`, calling `visit(depth, entry)` for every entry and
/// descending `levels` directories deep. Returns the entries visited.
pub fn list_dir<D, F>(
    sd: &SdStorage<D>,
    path: &str,
    levels: u8,
    mut visit: F,
) -> Result<usize, &'static str>
where
    D: BlockDevice,
    F: FnMut(u8, &DirEntry),
{
    info!("Listing directory: {}", path);
    let mut run = || -> Result<usize, &'static str> {
        let volume = sd.open_volume()?;
        list_in(&volume, path, None, levels, 0, &mut visit)
    };
    run().inspect_err(|e| warn!("list {} failed: {}", path, e))
}

// Only one directory handle is open at a time: every level is reopened
// from the volume root, and the n-th subdirectory is found by walking
// the directory again. No limit on width or depth.
fn list_in<D, F>(
    volume: &Volume<'_, D>,
    path: &str,
    trail: Option<&Trail<'_>>,
    levels: u8,
    depth: u8,
    visit: &mut F,
) -> Result<usize, &'static str>
where
    D: BlockDevice,
    F: FnMut(u8, &DirEntry),
{
    let mut count = 0;
    let mut nsub = 0usize;
    {
        let mut dir = open_path(volume, path)?;
        descend(&mut dir, trail)?;
        dir.iterate_dir(|entry| {
            if is_dot_entry(entry) || entry.attributes.is_volume() {
                return;
            }
            let e = DirEntry::from_fat(entry);
            if e.is_dir {
                info!("  DIR : {}", e.name_str());
                nsub += 1;
            } else {
                info!("  FILE: {}  SIZE: {}", e.name_str(), e.size);
            }
            visit(depth, &e);
            count += 1;
        })
        .map_err(|_| "iterate dir failed")?;
    }

    if levels == 0 {
        return Ok(count);
    }
    for n in 0..nsub {
        let sub = {
            let mut dir = open_path(volume, path)?;
            descend(&mut dir, trail)?;
            nth_subdir(&dir, n)?
        };
        let Some(entry) = sub else { break };
        let child = Trail { entry, parent: trail };
        count += list_in(volume, path, Some(&child), levels - 1, depth + 1, visit)?;
    }

    Ok(count)
}

fn nth_subdir<D>(dir: &Dir<'_, D>, n: usize) -> Result<Option<DirEntry>, &'static str>
where
    D: BlockDevice,
{
    let mut seen = 0;
    let mut found = None;
    dir.iterate_dir(|entry| {
        if found.is_some()
            || is_dot_entry(entry)
            || entry.attributes.is_volume()
            || !entry.attributes.is_directory()
        {
            return;
        }
        if seen == n {
            found = Some(DirEntry::from_fat(entry));
        }
        seen += 1;
    })
    .map_err(|_| "iterate dir failed")?;
    Ok(found)
}

pub fn create_dir<D>(sd: &SdStorage<D>, path: &str) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Creating Dir: {}", path);
    let run = || -> Result<(), &'static str> {
        let (parent, leaf) = split_parent(path)?;
        let volume = sd.open_volume()?;
        let dir = open_path(&volume, parent)?;
        dir.make_dir_in_dir(leaf).map_err(|_| "make dir failed")
    };
    run()
        .inspect(|_| info!("Dir created"))
        .inspect_err(|e| warn!("mkdir failed: {}", e))
}

// block and offset of the entry for an empty directory at `path`
fn locate_empty_dir<D>(sd: &SdStorage<D>, path: &str) -> Result<(u32, u32), &'static str>
where
    D: BlockDevice,
{
    let (parent, leaf) = split_parent(path)?;
    let volume = sd.open_volume()?;
    let dir = open_path(&volume, parent)?;
    let entry = dir
        .find_directory_entry(leaf)
        .map_err(|_| "no such directory")?;
    if !entry.attributes.is_directory() {
        return Err("not a directory");
    }

    // "." and ".." don't count
    let sub = dir.open_dir(leaf).map_err(|_| "open dir failed")?;
    let mut used = 0usize;
    sub.iterate_dir(|e| {
        if !is_dot_entry(e) {
            used += 1;
        }
    })
    .map_err(|_| "iterate dir failed")?;
    if used > 0 {
        return Err("directory not empty");
    }

    Ok((entry.entry_block.0, entry.entry_offset))
}

pub fn remove_dir<D>(sd: &mut SdStorage<D>, path: &str) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Removing Dir: {}", path);
    locate_empty_dir(sd, path)
        .and_then(|(block, offset)| sd.with_device(|dev| fat::remove_entry(dev, block, offset)))
        .inspect(|_| info!("Dir removed"))
        .inspect_err(|e| warn!("rmdir failed: {}", e))
}

/// Stream the file to `sink` in chunks; returns the byte count.
pub fn read_file<D, F>(
    sd: &SdStorage<D>,
    path: &str,
    mut sink: F,
) -> Result<usize, &'static str>
where
    D: BlockDevice,
    F: FnMut(&[u8]),
{
    info!("Reading file: {}", path);
    let mut run = || -> Result<usize, &'static str> {
        let (parent, leaf) = split_parent(path)?;
        let volume = sd.open_volume()?;
        let dir = open_path(&volume, parent)?;
        let file = dir
            .open_file_in_dir(leaf, Mode::ReadOnly)
            .map_err(|_| "open file for reading failed")?;

        let mut buf = [0u8; CHUNK];
        let mut total = 0;
        while !file.is_eof() {
            let n = file.read(&mut buf).map_err(|_| "read failed")?;
            if n == 0 {
                break;
            }
            sink(&buf[..n]);
            total += n;
        }
        Ok(total)
    };
    run().inspect_err(|e| warn!("read {} failed: {}", path, e))
}

fn write_with_mode<D>(
    sd: &SdStorage<D>,
    path: &str,
    data: &[u8],
    mode: Mode,
) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    let (parent, leaf) = split_parent(path)?;
    let volume = sd.open_volume()?;
    let dir = open_path(&volume, parent)?;
    let file = dir
        .open_file_in_dir(leaf, mode)
        .map_err(|_| "open file for writing failed")?;
    if !data.is_empty() {
        file.write(data).map_err(|_| "write failed")?;
    }
    file.flush().map_err(|_| "flush failed")?;
    Ok(())
}

// create or truncate
pub fn write_file<D>(sd: &SdStorage<D>, path: &str, data: &[u8]) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Writing file: {}", path);
    write_with_mode(sd, path, data, Mode::ReadWriteCreateOrTruncate)
        .inspect(|_| info!("File written"))
        .inspect_err(|e| warn!("Write failed: {}", e))
}

// create or append
pub fn append_file<D>(sd: &SdStorage<D>, path: &str, data: &[u8]) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Appending to file: {}", path);
    write_with_mode(sd, path, data, Mode::ReadWriteCreateOrAppend)
        .inspect(|_| info!("Message appended"))
        .inspect_err(|e| warn!("Append failed: {}", e))
}

fn copy_file<D>(
    src_dir: &Dir<'_, D>,
    src_name: &str,
    dst_dir: &Dir<'_, D>,
    dst_name: &str,
) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    let src = src_dir
        .open_file_in_dir(src_name, Mode::ReadOnly)
        .map_err(|_| "open source failed")?;
    let dst = dst_dir
        .open_file_in_dir(dst_name, Mode::ReadWriteCreate)
        .map_err(|_| "create target failed")?;

    let mut buf = [0u8; CHUNK];
    while !src.is_eof() {
        let n = src.read(&mut buf).map_err(|_| "read failed")?;
        if n == 0 {
            break;
        }
        dst.write(&buf[..n]).map_err(|_| "write failed")?;
    }
    dst.flush().map_err(|_| "flush failed")?;
    Ok(())
}

// Moves across directories are finished here. A rename within one
// directory returns the entry location and new name for an in-place edit.
fn prepare_rename<D>(
    sd: &SdStorage<D>,
    from: &str,
    to: &str,
) -> Result<Option<(u32, u32, [u8; 11])>, &'static str>
where
    D: BlockDevice,
{
    let (from_parent, from_leaf) = split_parent(from)?;
    let (to_parent, to_leaf) = split_parent(to)?;
    let new_name = fat::encode_83(to_leaf)?;

    let volume = sd.open_volume()?;
    let src_dir = open_path(&volume, from_parent)?;
    let entry = src_dir
        .find_directory_entry(from_leaf)
        .map_err(|_| "no such file")?;

    if same_dir(from_parent, to_parent) {
        if src_dir.find_directory_entry(to_leaf).is_ok() {
            return Err("target exists");
        }
        return Ok(Some((entry.entry_block.0, entry.entry_offset, new_name)));
    }

    if entry.attributes.is_directory() {
        return Err("cannot move a directory");
    }
    let dst_dir = open_path(&volume, to_parent)?;
    if dst_dir.find_directory_entry(to_leaf).is_ok() {
        return Err("target exists");
    }
    copy_file(&src_dir, from_leaf, &dst_dir, to_leaf)?;
    src_dir
        .delete_file_in_dir(from_leaf)
        .map_err(|_| "delete source failed")?;
    Ok(None)
}

/// Rename or move a file. Directories can be renamed but not moved.
pub fn rename_file<D>(sd: &mut SdStorage<D>, from: &str, to: &str) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Renaming file {} to {}", from, to);
    prepare_rename(sd, from, to)
        .and_then(|in_place| match in_place {
            Some((block, offset, name)) => {
                sd.with_device(|dev| fat::rename_entry(dev, block, offset, &name))
            }
            None => Ok(()),
        })
        .inspect(|_| info!("File renamed"))
        .inspect_err(|e| warn!("Rename failed: {}", e))
}

pub fn delete_file<D>(sd: &SdStorage<D>, path: &str) -> Result<(), &'static str>
where
    D: BlockDevice,
{
    info!("Deleting file: {}", path);
    let run = || -> Result<(), &'static str> {
        let (parent, leaf) = split_parent(path)?;
        let volume = sd.open_volume()?;
        let dir = open_path(&volume, parent)?;
        dir.delete_file_in_dir(leaf).map_err(|_| "delete failed")
    };
    run()
        .inspect(|_| info!("File deleted"))
        .inspect_err(|e| warn!("Delete failed: {}", e))
}

pub fn file_size<D>(sd: &SdStorage<D>, path: &str) -> Result<u32, &'static str>
where
    D: BlockDevice,
{
    let (parent, leaf) = split_parent(path)?;
    let volume = sd.open_volume()?;
    let dir = open_path(&volume, parent)?;
    let entry = dir
        .find_directory_entry(leaf)
        .map_err(|_| "no such file")?;
    Ok(entry.size)
}

// total and used bytes of volume 0, logged in MB
pub fn space<D>(sd: &mut SdStorage<D>) -> Result<fat::Usage, &'static str>
where
    D: BlockDevice,
{
    sd.with_device(fat::usage)
        .inspect(|u| {
            info!("Total space: {}MB", u.total_bytes / (1024 * 1024));
            info!("Used space: {}MB", u.used_bytes / (1024 * 1024));
        })
        .inspect_err(|e| warn!("space query failed: {}", e))
}

/// Read the whole file in 512-byte chunks, then overwrite it with 1 MiB,
/// timing both with `now_ms`.
pub fn test_file_io<D, N>(
    sd: &SdStorage<D>,
    path: &str,
    now_ms: N,
) -> Result<IoBench, &'static str>
where
    D: BlockDevice,
    N: FnMut() -> u64,
{
    test_file_io_chunks(sd, path, BENCH_WRITE_CHUNKS, now_ms)
}

pub fn test_file_io_chunks<D, N>(
    sd: &SdStorage<D>,
    path: &str,
    write_chunks: usize,
    mut now_ms: N,
) -> Result<IoBench, &'static str>
where
    D: BlockDevice,
    N: FnMut() -> u64,
{
    let (parent, leaf) = split_parent(path)?;
    let volume = sd.open_volume()?;
    let dir = open_path(&volume, parent)?;

    let mut buf = [0u8; CHUNK];
    let mut bench = IoBench {
        read_bytes: 0,
        read_ms: 0,
        written_bytes: 0,
        write_ms: 0,
    };

    // a missing file only skips the read half
    match dir.open_file_in_dir(leaf, Mode::ReadOnly) {
        Ok(file) => {
            let len = file.length();
            let start = now_ms();
            let mut left = len;
            while left > 0 {
                let want = (left as usize).min(CHUNK);
                let n = file.read(&mut buf[..want]).map_err(|_| "read failed")?;
                if n == 0 {
                    break;
                }
                left -= n as u32;
            }
            bench.read_bytes = len - left;
            bench.read_ms = now_ms().saturating_sub(start);
            info!("{} bytes read for {} ms", bench.read_bytes, bench.read_ms);
        }
        Err(_) => warn!("Failed to open file for reading"),
    }

    let file = dir
        .open_file_in_dir(leaf, Mode::ReadWriteCreateOrTruncate)
        .map_err(|_| "open file for writing failed")
        .inspect_err(|e| warn!("{}", e))?;
    let start = now_ms();
    for _ in 0..write_chunks {
        file.write(&buf).map_err(|_| "write failed")?;
    }
    file.flush().map_err(|_| "flush failed")?;
    bench.written_bytes = (write_chunks * CHUNK) as u32;
    bench.write_ms = now_ms().saturating_sub(start);
    info!("{} bytes written for {} ms", bench.written_bytes, bench.write_ms);

    Ok(bench)
}

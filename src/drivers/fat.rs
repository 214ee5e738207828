// Volume work the FAT volume manager doesn't offer: in-place rename,
// removal of an (empty) directory and a space usage count. These run on
// the bare block device while no volume is open (SdStorage::with_device).
//
// Entries are located by the absolute block and byte offset reported
// in embedded_sdmmc::DirEntry. Long-name (VFAT) slots directly in front
// of an entry are dropped along with it; a run that continues into the
// previous cluster of a subdirectory is only cleared up to the cluster
// start. Only volume 0 of an MBR disk is handled.

use embedded_sdmmc::{Block, BlockDevice, BlockIdx};

const ENTRY_LEN: usize = 32;
const DELETED: u8 = 0xE5;
const ATTR_LONG_NAME: u8 = 0x0F;
// set in the sequence byte of the physically first long-name slot
const LFN_LAST: u8 = 0x40;

// unused slot, nothing follows it
const END_OF_DIR: u8 = 0x00;

const MBR_PART1: usize = 446;

struct Geometry {
    fat_start: u32,
    fat_blocks: u32,
    num_fats: u32,
    root_start: u32,
    data_start: u32,
    blocks_per_cluster: u32,
    cluster_count: u32,
    fat32: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

fn le16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

fn le32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_block<D: BlockDevice>(dev: &D, idx: u32) -> Result<Block, &'static str> {
    let mut blocks = [Block::new()];
    dev.read(&mut blocks, BlockIdx(idx))
        .map_err(|_| "block read failed")?;
    let [block] = blocks;
    Ok(block)
}

fn write_block<D: BlockDevice>(dev: &D, idx: u32, block: &Block) -> Result<(), &'static str> {
    dev.write(core::slice::from_ref(block), BlockIdx(idx))
        .map_err(|_| "block write failed")
}

fn geometry<D: BlockDevice>(dev: &D) -> Result<Geometry, &'static str> {
    let mbr = read_block(dev, 0)?;
    let lba_start = le32(&mbr.contents, MBR_PART1 + 8);

    let bpb = read_block(dev, lba_start)?;
    let b = &bpb.contents;
    if b[510] != 0x55 || b[511] != 0xAA {
        return Err("bad boot sector");
    }

    let blocks_per_cluster = u32::from(b[13]);
    let reserved = u32::from(le16(b, 14));
    let num_fats = u32::from(b[16]);
    let root_entries = u32::from(le16(b, 17));
    let total = match le16(b, 19) {
        0 => le32(b, 32),
        n => u32::from(n),
    };
    let fat_blocks = match le16(b, 22) {
        0 => le32(b, 36),
        n => u32::from(n),
    };
    if blocks_per_cluster == 0 || num_fats == 0 {
        return Err("bad boot sector");
    }

    let root_blocks = (root_entries * ENTRY_LEN as u32).div_ceil(512);
    let data_blocks = total
        .checked_sub(reserved + num_fats * fat_blocks + root_blocks)
        .ok_or("bad boot sector")?;
    let cluster_count = data_blocks / blocks_per_cluster;
    let fat_start = lba_start + reserved;
    let root_start = fat_start + num_fats * fat_blocks;

    Ok(Geometry {
        fat_start,
        fat_blocks,
        num_fats,
        root_start,
        data_start: root_start + root_blocks,
        blocks_per_cluster,
        cluster_count,
        fat32: cluster_count >= 65525,
    })
}

impl Geometry {
    fn entry_width(&self) -> u32 {
        if self.fat32 { 4 } else { 2 }
    }

    // FAT block and byte offset holding the entry for `cluster`
    fn locate(&self, cluster: u32) -> Result<(u32, usize), &'static str> {
        if !(2..self.cluster_count + 2).contains(&cluster) {
            return Err("cluster out of range");
        }
        let byte = cluster * self.entry_width();
        let blk = byte / 512;
        if blk >= self.fat_blocks {
            return Err("cluster out of range");
        }
        Ok((blk, (byte % 512) as usize))
    }

    // directory slots continue in the block before `block` (same root
    // region, or same cluster of a subdirectory)
    fn has_previous_slot_block(&self, block: u32) -> bool {
        if block >= self.data_start {
            (block - self.data_start) % self.blocks_per_cluster != 0
        } else {
            block > self.root_start
        }
    }
}

// zero every FAT entry along the chain starting at `first`
fn free_chain<D: BlockDevice>(dev: &D, geo: &Geometry, first: u32) -> Result<(), &'static str> {
    let end = if geo.fat32 { 0x0FFF_FFF7u32 } else { 0xFFF7u32 };

    let mut cluster = first;
    let mut steps = 0u32;
    while (2..end).contains(&cluster) {
        if steps > geo.cluster_count {
            return Err("cluster chain loops");
        }
        steps += 1;

        let (blk, off) = geo.locate(cluster)?;
        let mut next = 0;

        for fat in 0..geo.num_fats {
            let idx = geo.fat_start + fat * geo.fat_blocks + blk;
            let mut block = read_block(dev, idx)?;
            let c = &mut block.contents;
            if geo.fat32 {
                let raw = le32(c, off);
                if fat == 0 {
                    next = raw & 0x0FFF_FFFF;
                }
                // top nibble is reserved and kept
                c[off..off + 4].copy_from_slice(&(raw & 0xF000_0000).to_le_bytes());
            } else {
                if fat == 0 {
                    next = u32::from(le16(c, off));
                }
                c[off..off + 2].copy_from_slice(&0u16.to_le_bytes());
            }
            write_block(dev, idx, &block)?;
        }

        cluster = next;
    }
    Ok(())
}

// checksum of the 8.3 name stored in each of its long-name slots
fn lfn_checksum(name: &[u8]) -> u8 {
    name.iter().fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

// mark the long-name slots belonging to the entry at `block`/`off` deleted
fn drop_long_name<D: BlockDevice>(
    dev: &D,
    geo: &Geometry,
    mut block: u32,
    mut off: usize,
    checksum: u8,
) -> Result<(), &'static str> {
    loop {
        if off == 0 {
            if !geo.has_previous_slot_block(block) {
                return Ok(());
            }
            block -= 1;
            off = 512;
        }
        off -= ENTRY_LEN;

        let mut data = read_block(dev, block)?;
        let c = &mut data.contents;
        if c[off] == DELETED || c[off + 11] != ATTR_LONG_NAME || c[off + 13] != checksum {
            return Ok(());
        }
        let first_slot = c[off] & LFN_LAST != 0;
        c[off] = DELETED;
        write_block(dev, block, &data)?;
        if first_slot {
            return Ok(());
        }
    }
}

/// Encode a name as the 11-byte space padded 8.3 form stored on disk.
pub fn encode_83(name: &str) -> Result<[u8; 11], &'static str> {
    if name.is_empty() || name == "." || name == ".." {
        return Err("invalid 8.3 name");
    }
    let (base, ext) = match name.rsplit_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err("invalid 8.3 name");
    }

    let mut out = [b' '; 11];
    for (slot, &ch) in out[..8].iter_mut().zip(base.as_bytes()) {
        *slot = valid_83_char(ch)?;
    }
    for (slot, &ch) in out[8..].iter_mut().zip(ext.as_bytes()) {
        *slot = valid_83_char(ch)?;
    }
    if out[0] == DELETED {
        out[0] = 0x05;
    }
    Ok(out)
}

fn valid_83_char(ch: u8) -> Result<u8, &'static str> {
    match ch {
        b'a'..=b'z' => Ok(ch.to_ascii_uppercase()),
        b'A'..=b'Z' | b'0'..=b'9' => Ok(ch),
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'(' | b')' | b'-' | b'@' | b'^' | b'_'
        | b'`' | b'{' | b'}' | b'~' => Ok(ch),
        0x80..=0xFF => Ok(ch),
        _ => Err("invalid 8.3 name"),
    }
}

fn check_entry(block: &Block, offset: u32) -> Result<usize, &'static str> {
    let off = offset as usize;
    if off % ENTRY_LEN != 0 || off + ENTRY_LEN > block.contents.len() {
        return Err("bad entry offset");
    }
    match block.contents[off] {
        DELETED | END_OF_DIR => Err("entry not in use"),
        _ => Ok(off),
    }
}

/// Overwrite the 8.3 name of the entry at `block`/`offset`. Long-name
/// slots of the old name are dropped.
pub fn rename_entry<D: BlockDevice>(
    dev: &D,
    block: u32,
    offset: u32,
    name: &[u8; 11],
) -> Result<(), &'static str> {
    let geo = geometry(dev)?;

    let mut data = read_block(dev, block)?;
    let off = check_entry(&data, offset)?;
    let checksum = lfn_checksum(&data.contents[off..off + 11]);
    data.contents[off..off + 11].copy_from_slice(name);
    write_block(dev, block, &data)?;

    drop_long_name(dev, &geo, block, off, checksum)
}

/// Mark the entry at `block`/`offset` deleted and release its clusters.
pub fn remove_entry<D: BlockDevice>(dev: &D, block: u32, offset: u32) -> Result<(), &'static str> {
    let geo = geometry(dev)?;

    let mut data = read_block(dev, block)?;
    let off = check_entry(&data, offset)?;
    let c = &data.contents;
    let lo = u32::from(le16(c, off + 26));
    let hi = if geo.fat32 { u32::from(le16(c, off + 20)) } else { 0 };
    let first_cluster = hi << 16 | lo;
    let checksum = lfn_checksum(&c[off..off + 11]);

    data.contents[off] = DELETED;
    write_block(dev, block, &data)?;
    drop_long_name(dev, &geo, block, off, checksum)?;

    if first_cluster != 0 {
        free_chain(dev, &geo, first_cluster)?;
    }
    Ok(())
}

/// Volume size and the space taken by allocated clusters, from the first FAT.
pub fn usage<D: BlockDevice>(dev: &D) -> Result<Usage, &'static str> {
    let geo = geometry(dev)?;
    let width = geo.entry_width() as usize;
    let last = geo.cluster_count + 2;

    let mut used = 0u64;
    let mut cluster = 2u32;
    while cluster < last {
        let (blk, mut off) = geo.locate(cluster)?;
        let block = read_block(dev, geo.fat_start + blk)?;
        let c = &block.contents;
        while off < 512 && cluster < last {
            let value = if geo.fat32 {
                le32(c, off) & 0x0FFF_FFFF
            } else {
                u32::from(le16(c, off))
            };
            if value != 0 {
                used += 1;
            }
            off += width;
            cluster += 1;
        }
    }

    let cluster_bytes = u64::from(geo.blocks_per_cluster) * 512;
    Ok(Usage {
        total_bytes: u64::from(geo.cluster_count) * cluster_bytes,
        used_bytes: used * cluster_bytes,
    })
}

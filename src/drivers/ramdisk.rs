// In-memory block device with a freshly formatted FAT16 partition, for
// exercising the storage helpers on the host.
//
// Layout: MBR at block 0, one FAT16 partition from block 1, 8192 blocks,
// 1 block per cluster, 2 FATs of 32 blocks, 512 root entries.

use core::cell::{Cell, RefCell};

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

const PART_START: u32 = 1;
const PART_BLOCKS: u32 = 8192;
const RESERVED_BLOCKS: u16 = 1;
const NUM_FATS: u8 = 2;
const FAT_BLOCKS: u16 = 32;
const ROOT_ENTRIES: u16 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskError;

pub struct RamDisk {
    blocks: RefCell<std::vec::Vec<[u8; 512]>>,
    fail_reads: Cell<u32>,
    reads: Cell<u32>,
}

impl RamDisk {
    pub fn blank(blocks: usize) -> Self {
        Self {
            blocks: RefCell::new(std::vec![[0u8; 512]; blocks]),
            fail_reads: Cell::new(0),
            reads: Cell::new(0),
        }
    }

    pub fn formatted() -> Self {
        let disk = Self::blank((PART_START + PART_BLOCKS) as usize);
        {
            let mut blocks = disk.blocks.borrow_mut();

            let mbr = &mut blocks[0];
            let part = &mut mbr[446..462];
            part[4] = 0x06; // FAT16
            part[8..12].copy_from_slice(&PART_START.to_le_bytes());
            part[12..16].copy_from_slice(&PART_BLOCKS.to_le_bytes());
            mbr[510] = 0x55;
            mbr[511] = 0xAA;

            let bs = &mut blocks[PART_START as usize];
            bs[0..3].copy_from_slice(&[0xEB, 0x3C, 0x90]);
            bs[3..11].copy_from_slice(b"MSWIN4.1");
            bs[11..13].copy_from_slice(&512u16.to_le_bytes());
            bs[13] = 1;
            bs[14..16].copy_from_slice(&RESERVED_BLOCKS.to_le_bytes());
            bs[16] = NUM_FATS;
            bs[17..19].copy_from_slice(&ROOT_ENTRIES.to_le_bytes());
            bs[19..21].copy_from_slice(&(PART_BLOCKS as u16).to_le_bytes());
            bs[21] = 0xF8;
            bs[22..24].copy_from_slice(&FAT_BLOCKS.to_le_bytes());
            bs[24..26].copy_from_slice(&32u16.to_le_bytes());
            bs[26..28].copy_from_slice(&64u16.to_le_bytes());
            bs[28..32].copy_from_slice(&PART_START.to_le_bytes());
            bs[36] = 0x80;
            bs[38] = 0x29;
            bs[39..43].copy_from_slice(&0x1234_5678u32.to_le_bytes());
            bs[43..54].copy_from_slice(b"TESTDISK   ");
            bs[54..62].copy_from_slice(b"FAT16   ");
            bs[510] = 0x55;
            bs[511] = 0xAA;

            // clusters 0 and 1 are reserved
            for fat in 0..u32::from(NUM_FATS) {
                let first = PART_START + u32::from(RESERVED_BLOCKS) + fat * u32::from(FAT_BLOCKS);
                blocks[first as usize][0..4].copy_from_slice(&[0xF8, 0xFF, 0xFF, 0xFF]);
            }
        }
        disk
    }

    pub fn fail_next_reads(&self, n: u32) {
        self.fail_reads.set(n);
    }

    pub fn reads_attempted(&self) -> u32 {
        self.reads.get()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.borrow().len()
    }

    // FAT16 entry for `cluster` in the first FAT
    pub fn fat16_entry(&self, cluster: u32) -> u16 {
        let byte = cluster as usize * 2;
        let idx = (PART_START + u32::from(RESERVED_BLOCKS)) as usize + byte / 512;
        let blocks = self.blocks.borrow();
        let off = byte % 512;
        u16::from_le_bytes([blocks[idx][off], blocks[idx][off + 1]])
    }
}

impl BlockDevice for RamDisk {
    type Error = DiskError;

    fn read(&self, blocks: &mut [Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.reads.set(self.reads.get() + 1);
        let pending = self.fail_reads.get();
        if pending > 0 {
            self.fail_reads.set(pending - 1);
            return Err(DiskError);
        }
        let data = self.blocks.borrow();
        for (i, block) in blocks.iter_mut().enumerate() {
            let src = data
                .get(start_block_idx.0 as usize + i)
                .ok_or(DiskError)?;
            block.contents.copy_from_slice(src);
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        let mut data = self.blocks.borrow_mut();
        for (i, block) in blocks.iter().enumerate() {
            let dst = data
                .get_mut(start_block_idx.0 as usize + i)
                .ok_or(DiskError)?;
            dst.copy_from_slice(&block.contents);
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Self::Error> {
        Ok(BlockCount(self.blocks.borrow().len() as u32))
    }
}

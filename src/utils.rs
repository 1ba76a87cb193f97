// discedit/src/utils.rs

use std::{
    fs::{File, Metadata},
    io::{self, Read},
    path::Path,
};

use time::OffsetDateTime;

/// ISO 9660 logical block size.
pub const ISO_SECTOR_SIZE: usize = 2048;

/// Raw CD-DA frame size, as stored in a BIN companion file.
pub const CD_FRAME_SIZE: u64 = 2352;

pub const CD_FRAMES_PER_SECOND: u64 = 75;

/// Reads the entire file from a specified path and returns its content.
pub fn read_file_from_path(file_path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(file_path)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Number of logical blocks needed to hold `size` bytes.
pub fn sectors_for(size: u64) -> u32 {
    size.div_ceil(ISO_SECTOR_SIZE as u64) as u32
}

/// Host modification time, falling back to now when the platform cannot report it.
pub fn modified_time(metadata: &Metadata) -> OffsetDateTime {
    metadata
        .modified()
        .map(OffsetDateTime::from)
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// CRC32 of a whole file, streamed in fixed-size chunks.
pub fn checksum_file(file_path: &Path) -> io::Result<u32> {
    let mut file = File::open(file_path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finalize())
}

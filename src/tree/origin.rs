// discedit/src/tree/origin.rs
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::utils::ISO_SECTOR_SIZE;

/// Where a file node's bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataOrigin {
    /// Content held in memory, captured when the file was added or imported.
    Pending(Vec<u8>),
    /// Extent inside the ISO volume the tree was loaded from.
    Volume { lba: u32 },
    /// Byte range inside a CUE sheet's companion BIN file.
    Track { bin_path: PathBuf, offset: u64 },
}

impl DataOrigin {
    pub fn is_pending(&self) -> bool {
        matches!(self, DataOrigin::Pending(_))
    }

    /// Opens a reader over the `size` bytes this origin describes.
    ///
    /// Backing files are reopened on every call; no handle outlives the returned reader.
    pub fn open<'a>(
        &'a self,
        size: u64,
        volume_source: Option<&Path>,
    ) -> io::Result<Box<dyn Read + 'a>> {
        match self {
            DataOrigin::Pending(data) => Ok(Box::new(Cursor::new(data.as_slice()))),
            DataOrigin::Volume { lba } => {
                let source = volume_source.ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("No source image is attached for extent at LBA {}", lba),
                    )
                })?;
                let mut image = File::open(source)?;
                image.seek(SeekFrom::Start(*lba as u64 * ISO_SECTOR_SIZE as u64))?;
                Ok(Box::new(image.take(size)))
            }
            DataOrigin::Track { bin_path, offset } => {
                let mut bin = File::open(bin_path).map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Cannot open BIN file {}: {}", bin_path.display(), e),
                    )
                })?;
                bin.seek(SeekFrom::Start(*offset))?;
                Ok(Box::new(bin.take(size)))
            }
        }
    }

    /// Reads the full content this origin describes into memory.
    pub fn read_all(&self, size: u64, volume_source: Option<&Path>) -> io::Result<Vec<u8>> {
        if let DataOrigin::Pending(data) = self {
            return Ok(data.clone());
        }
        let mut content = Vec::with_capacity(size.min(64 * 1024 * 1024) as usize);
        self.open(size, volume_source)?.read_to_end(&mut content)?;
        Ok(content)
    }
}

// discedit/src/iso/reader.rs
//! Read-only access to an existing ISO 9660 volume.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use time::OffsetDateTime;

use crate::iso::dir_record::IsoDirEntry;
use crate::iso::volume_descriptor::{VolumeDescriptorSet, read_volume_descriptors};
use crate::tree::names_match;
use crate::utils::{ISO_SECTOR_SIZE, sectors_for};

/// Directory extents larger than this are treated as corrupt.
const MAX_DIRECTORY_EXTENT: u32 = 64 * 1024 * 1024;

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryStat {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub lba: u32,
    pub recorded: OffsetDateTime,
}

impl EntryStat {
    /// `.` or `..`.
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// The operations the loaders need from a disc image.
pub trait VolumeReader {
    fn volume_id(&self) -> &str;
    fn system_id(&self) -> &str;
    /// Lists the directory at an absolute `/`-separated path, pseudo-entries included.
    fn read_dir(&mut self, path: &str) -> io::Result<Vec<EntryStat>>;
    /// Reads `count` logical blocks starting at `lba`. Short at end of image.
    fn read_blocks(&mut self, lba: u32, count: u32) -> io::Result<Vec<u8>>;
}

/// Which directory hierarchy supplies display names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameScheme {
    RockRidge,
    Joliet,
    Primary,
}

/// An ISO 9660 volume backed by any seekable reader.
pub struct IsoImage<R> {
    inner: R,
    descriptors: VolumeDescriptorSet,
    scheme: NameScheme,
}

impl IsoImage<File> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("Cannot open image {}: {}", path.display(), e),
            )
        })?;
        Self::new(file)
    }
}

impl<R: Read + Seek> IsoImage<R> {
    pub fn new(mut inner: R) -> io::Result<Self> {
        let descriptors = read_volume_descriptors(&mut inner)?;
        let mut image = Self {
            inner,
            descriptors,
            scheme: NameScheme::Primary,
        };

        let primary_root = image.descriptors.primary.root.clone();
        let root_records = image.read_records(&primary_root)?;
        image.scheme = if root_records.iter().any(IsoDirEntry::has_rock_ridge) {
            NameScheme::RockRidge
        } else if image.descriptors.joliet_root.is_some() {
            NameScheme::Joliet
        } else {
            NameScheme::Primary
        };
        debug!(
            "Opened volume '{}' using {:?} names (El Torito boot record: {})",
            image.descriptors.primary.volume_id, image.scheme, image.descriptors.has_boot_record
        );
        Ok(image)
    }

    pub fn name_scheme(&self) -> NameScheme {
        self.scheme
    }

    pub fn descriptors(&self) -> &VolumeDescriptorSet {
        &self.descriptors
    }

    fn root_record(&self) -> &IsoDirEntry {
        match (self.scheme, &self.descriptors.joliet_root) {
            (NameScheme::Joliet, Some(root)) => root,
            _ => &self.descriptors.primary.root,
        }
    }

    fn display_name(&self, entry: &IsoDirEntry) -> String {
        if let Some(pseudo) = entry.pseudo_name() {
            return pseudo.to_string();
        }
        match self.scheme {
            NameScheme::RockRidge => entry
                .rock_ridge_name()
                .unwrap_or_else(|| entry.primary_name()),
            NameScheme::Joliet => entry.joliet_name(),
            NameScheme::Primary => entry.primary_name(),
        }
    }

    /// Reads every record of a directory extent.
    fn read_records(&mut self, dir: &IsoDirEntry) -> io::Result<Vec<IsoDirEntry>> {
        if dir.size > MAX_DIRECTORY_EXTENT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Directory extent at LBA {} is {} bytes", dir.lba, dir.size),
            ));
        }
        let extent = self.read_blocks(dir.lba, sectors_for(dir.size as u64))?;
        let extent = &extent[..extent.len().min(dir.size as usize)];

        let mut records = Vec::new();
        for sector in extent.chunks(ISO_SECTOR_SIZE) {
            let mut pos = 0;
            // A zero length byte pads out the rest of the sector.
            while pos < sector.len() && sector[pos] != 0 {
                let len = sector[pos] as usize;
                if pos + len > sector.len() {
                    break;
                }
                records.push(IsoDirEntry::parse(&sector[pos..pos + len])?);
                pos += len;
            }
        }
        Ok(records)
    }

    fn lookup_dir(&mut self, path: &str) -> io::Result<IsoDirEntry> {
        let mut current = self.root_record().clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let records = self.read_records(&current)?;
            let found = records
                .into_iter()
                .find(|r| !r.is_pseudo() && names_match(&self.display_name(r), segment))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("'{}' not found in image while resolving {}", segment, path),
                    )
                })?;
            if !found.is_directory() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' is not a directory", segment),
                ));
            }
            current = found;
        }
        Ok(current)
    }
}

impl<R: Read + Seek> VolumeReader for IsoImage<R> {
    fn volume_id(&self) -> &str {
        &self.descriptors.primary.volume_id
    }

    fn system_id(&self) -> &str {
        &self.descriptors.primary.system_id
    }

    fn read_dir(&mut self, path: &str) -> io::Result<Vec<EntryStat>> {
        let dir = self.lookup_dir(path)?;
        let records = self.read_records(&dir)?;
        Ok(records
            .iter()
            .map(|record| EntryStat {
                name: self.display_name(record),
                is_directory: record.is_directory(),
                size: if record.is_directory() { 0 } else { record.size as u64 },
                lba: record.lba,
                recorded: record.recorded_at(),
            })
            .collect())
    }

    fn read_blocks(&mut self, lba: u32, count: u32) -> io::Result<Vec<u8>> {
        let start = lba as u64 * ISO_SECTOR_SIZE as u64;
        let len = count as u64 * ISO_SECTOR_SIZE as u64;
        self.inner.seek(SeekFrom::Start(start))?;
        let mut blocks = Vec::with_capacity(len as usize);
        (&mut self.inner).take(len).read_to_end(&mut blocks)?;
        Ok(blocks)
    }
}

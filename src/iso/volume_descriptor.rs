// discedit/src/iso/volume_descriptor.rs
use std::io::{self, Read, Seek, SeekFrom};

use log::debug;

use crate::iso::dir_record::IsoDirEntry;
use crate::utils::ISO_SECTOR_SIZE;

pub const ISO_VOLUME_DESCRIPTOR_TERMINATOR: u8 = 255;
pub const ISO_VOLUME_DESCRIPTOR_PRIMARY: u8 = 1;
pub const ISO_VOLUME_DESCRIPTOR_SUPPLEMENTARY: u8 = 2;
pub const ISO_VOLUME_DESCRIPTOR_BOOT_RECORD: u8 = 0;
pub const ISO_ID: &[u8] = b"CD001";
pub const ISO_VERSION: u8 = 1;
pub const VOLUME_DESCRIPTOR_START_LBA: u32 = 16;
pub const PVD_SYSTEM_ID_OFFSET: usize = 8;
pub const PVD_VOLUME_ID_OFFSET: usize = 40;
pub const PVD_TOTAL_SECTORS_OFFSET: usize = 80;
pub const SVD_ESCAPE_SEQUENCES_OFFSET: usize = 88;
pub const PVD_LOGICAL_BLOCK_SIZE_OFFSET: usize = 128;
pub const PVD_ROOT_DIR_RECORD_OFFSET: usize = 156;

const ID_FIELD_LEN: usize = 32;
const MAX_DESCRIPTORS: u32 = 100;
const JOLIET_ESCAPES: [&[u8; 3]; 3] = [b"%/@", b"%/C", b"%/E"];

/// Fields of the Primary Volume Descriptor the editor cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryVolumeDescriptor {
    pub system_id: String,
    pub volume_id: String,
    pub total_sectors: u32,
    pub logical_block_size: u16,
    pub root: IsoDirEntry,
}

impl PrimaryVolumeDescriptor {
    pub fn parse(sector: &[u8]) -> io::Result<Self> {
        check_header(sector)?;
        if sector[0] != ISO_VOLUME_DESCRIPTOR_PRIMARY {
            return Err(invalid("Not a primary volume descriptor"));
        }
        let logical_block_size = u16::from_le_bytes([
            sector[PVD_LOGICAL_BLOCK_SIZE_OFFSET],
            sector[PVD_LOGICAL_BLOCK_SIZE_OFFSET + 1],
        ]);
        if logical_block_size as usize != ISO_SECTOR_SIZE {
            return Err(invalid(format!(
                "Unsupported logical block size {}",
                logical_block_size
            )));
        }
        Ok(Self {
            system_id: decode_id(&sector[PVD_SYSTEM_ID_OFFSET..PVD_SYSTEM_ID_OFFSET + ID_FIELD_LEN]),
            volume_id: decode_id(&sector[PVD_VOLUME_ID_OFFSET..PVD_VOLUME_ID_OFFSET + ID_FIELD_LEN]),
            total_sectors: u32::from_le_bytes([
                sector[PVD_TOTAL_SECTORS_OFFSET],
                sector[PVD_TOTAL_SECTORS_OFFSET + 1],
                sector[PVD_TOTAL_SECTORS_OFFSET + 2],
                sector[PVD_TOTAL_SECTORS_OFFSET + 3],
            ]),
            logical_block_size,
            root: IsoDirEntry::parse(&sector[PVD_ROOT_DIR_RECORD_OFFSET..])?,
        })
    }

    /// Encodes the descriptor as a full sector.
    pub fn to_sector(&self) -> [u8; ISO_SECTOR_SIZE] {
        let mut pvd = descriptor_sector(ISO_VOLUME_DESCRIPTOR_PRIMARY);
        encode_id(&mut pvd, PVD_SYSTEM_ID_OFFSET, &self.system_id);
        encode_id(&mut pvd, PVD_VOLUME_ID_OFFSET, &self.volume_id);

        pvd[PVD_TOTAL_SECTORS_OFFSET..PVD_TOTAL_SECTORS_OFFSET + 4]
            .copy_from_slice(&self.total_sectors.to_le_bytes());
        pvd[PVD_TOTAL_SECTORS_OFFSET + 4..PVD_TOTAL_SECTORS_OFFSET + 8]
            .copy_from_slice(&self.total_sectors.to_be_bytes());

        pvd[PVD_LOGICAL_BLOCK_SIZE_OFFSET..PVD_LOGICAL_BLOCK_SIZE_OFFSET + 2]
            .copy_from_slice(&self.logical_block_size.to_le_bytes());
        pvd[PVD_LOGICAL_BLOCK_SIZE_OFFSET + 2..PVD_LOGICAL_BLOCK_SIZE_OFFSET + 4]
            .copy_from_slice(&self.logical_block_size.to_be_bytes());

        let root_bytes = self.root.to_bytes();
        pvd[PVD_ROOT_DIR_RECORD_OFFSET..PVD_ROOT_DIR_RECORD_OFFSET + root_bytes.len()]
            .copy_from_slice(&root_bytes);
        pvd
    }
}

/// Encodes a Joliet supplementary descriptor (UCS-2 level 3) pointing at `root`.
pub fn joliet_descriptor_sector(root: &IsoDirEntry) -> [u8; ISO_SECTOR_SIZE] {
    let mut svd = descriptor_sector(ISO_VOLUME_DESCRIPTOR_SUPPLEMENTARY);
    svd[SVD_ESCAPE_SEQUENCES_OFFSET..SVD_ESCAPE_SEQUENCES_OFFSET + 3].copy_from_slice(b"%/E");
    svd[PVD_LOGICAL_BLOCK_SIZE_OFFSET..PVD_LOGICAL_BLOCK_SIZE_OFFSET + 2]
        .copy_from_slice(&(ISO_SECTOR_SIZE as u16).to_le_bytes());
    let root_bytes = root.to_bytes();
    svd[PVD_ROOT_DIR_RECORD_OFFSET..PVD_ROOT_DIR_RECORD_OFFSET + root_bytes.len()]
        .copy_from_slice(&root_bytes);
    svd
}

pub fn terminator_sector() -> [u8; ISO_SECTOR_SIZE] {
    descriptor_sector(ISO_VOLUME_DESCRIPTOR_TERMINATOR)
}

/// Everything found in the volume descriptor set.
#[derive(Clone, Debug)]
pub struct VolumeDescriptorSet {
    pub primary: PrimaryVolumeDescriptor,
    pub joliet_root: Option<IsoDirEntry>,
    pub has_boot_record: bool,
}

/// Reads descriptors from LBA 16 up to the set terminator.
pub fn read_volume_descriptors<R: Read + Seek>(image: &mut R) -> io::Result<VolumeDescriptorSet> {
    let mut primary = None;
    let mut joliet_root = None;
    let mut has_boot_record = false;
    let mut sector = [0u8; ISO_SECTOR_SIZE];

    for index in 0..MAX_DESCRIPTORS {
        let lba = VOLUME_DESCRIPTOR_START_LBA + index;
        image.seek(SeekFrom::Start(lba as u64 * ISO_SECTOR_SIZE as u64))?;
        image.read_exact(&mut sector).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                invalid("Image ends inside the volume descriptor set")
            } else {
                e
            }
        })?;
        check_header(&sector)?;

        match sector[0] {
            ISO_VOLUME_DESCRIPTOR_BOOT_RECORD => has_boot_record = true,
            ISO_VOLUME_DESCRIPTOR_PRIMARY if primary.is_none() => {
                primary = Some(PrimaryVolumeDescriptor::parse(&sector)?);
            }
            ISO_VOLUME_DESCRIPTOR_SUPPLEMENTARY => {
                let escapes = &sector[SVD_ESCAPE_SEQUENCES_OFFSET..SVD_ESCAPE_SEQUENCES_OFFSET + 3];
                if JOLIET_ESCAPES.iter().any(|e| &e[..] == escapes) {
                    joliet_root = Some(IsoDirEntry::parse(&sector[PVD_ROOT_DIR_RECORD_OFFSET..])?);
                }
            }
            ISO_VOLUME_DESCRIPTOR_TERMINATOR => break,
            other => debug!("Skipping volume descriptor type {} at LBA {}", other, lba),
        }
    }

    let primary = primary.ok_or_else(|| invalid("No primary volume descriptor found"))?;
    Ok(VolumeDescriptorSet {
        primary,
        joliet_root,
        has_boot_record,
    })
}

fn descriptor_sector(kind: u8) -> [u8; ISO_SECTOR_SIZE] {
    let mut sector = [0u8; ISO_SECTOR_SIZE];
    sector[0] = kind;
    sector[1..6].copy_from_slice(ISO_ID);
    sector[6] = ISO_VERSION;
    sector
}

fn check_header(sector: &[u8]) -> io::Result<()> {
    if sector.len() < ISO_SECTOR_SIZE || &sector[1..6] != ISO_ID || sector[6] != ISO_VERSION {
        return Err(invalid("Missing CD001 volume descriptor signature"));
    }
    Ok(())
}

/// Identifier fields are space padded; some mastering tools pad with NUL instead.
fn decode_id(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches([' ', '\0'])
        .trim()
        .to_string()
}

fn encode_id(sector: &mut [u8], offset: usize, value: &str) {
    let mut field = [b' '; ID_FIELD_LEN];
    let bytes = value.as_bytes();
    let len = bytes.len().min(ID_FIELD_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    sector[offset..offset + ID_FIELD_LEN].copy_from_slice(&field);
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

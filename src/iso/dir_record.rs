// discedit/src/iso/dir_record.rs

use std::io;

use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

pub const FLAG_DIRECTORY: u8 = 0x02;

/// Fixed part of a directory record, before the file identifier.
pub const DIR_RECORD_HEADER_LEN: usize = 33;

const RR_NAME_SIGNATURE: &[u8; 2] = b"NM";
const RR_NAME_CONTINUE: u8 = 0x01;
const RR_SIGNATURES: [&[u8; 2]; 5] = [b"SP", b"RR", b"NM", b"PX", b"TF"];

/// ISO9660 directory record structure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsoDirEntry {
    pub lba: u32,
    pub size: u32,
    pub flags: u8,
    pub recorded: [u8; 7],
    pub identifier: Vec<u8>,
    pub system_use: Vec<u8>,
}

impl IsoDirEntry {
    /// Builds a record from a display name. `.` and `..` map to the 0x00 / 0x01
    /// identifiers; file names get the `;1` version suffix.
    pub fn new(name: &str, lba: u32, size: u32, flags: u8) -> Self {
        let identifier = match name {
            "." => vec![0u8],
            ".." => vec![1u8],
            _ if flags & FLAG_DIRECTORY != 0 || name.contains(';') => name.as_bytes().to_vec(),
            _ => format!("{};1", name).into_bytes(),
        };
        Self {
            lba,
            size,
            flags,
            recorded: [0u8; 7],
            identifier,
            system_use: Vec::new(),
        }
    }

    /// Appends a Rock Ridge `NM` alternate-name entry to the system use area.
    pub fn with_rock_ridge_name(mut self, name: &str) -> Self {
        let bytes = name.as_bytes();
        self.system_use.extend_from_slice(RR_NAME_SIGNATURE);
        self.system_use.push((5 + bytes.len()) as u8);
        self.system_use.push(1);
        self.system_use.push(0);
        self.system_use.extend_from_slice(bytes);
        self
    }

    pub fn with_recorded(mut self, at: OffsetDateTime) -> Self {
        self.recorded = encode_recorded(at);
        self
    }

    /// Parses the record at the start of `data`.
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let record_len = *data.first().ok_or_else(|| invalid("Empty directory record"))? as usize;
        if record_len < DIR_RECORD_HEADER_LEN + 1 || record_len > data.len() {
            return Err(invalid(format!(
                "Directory record length {} is out of bounds",
                record_len
            )));
        }
        let record = &data[..record_len];
        let id_len = record[32] as usize;
        let id_end = DIR_RECORD_HEADER_LEN + id_len;
        if id_end > record_len {
            return Err(invalid("Directory record identifier overruns the record"));
        }
        // Identifier is padded to an even offset before the system use area.
        let system_use_start = (id_end + (id_len + 1) % 2).min(record_len);

        let mut recorded = [0u8; 7];
        recorded.copy_from_slice(&record[18..25]);

        Ok(Self {
            lba: u32::from_le_bytes([record[2], record[3], record[4], record[5]]),
            size: u32::from_le_bytes([record[10], record[11], record[12], record[13]]),
            flags: record[25],
            recorded,
            identifier: record[DIR_RECORD_HEADER_LEN..id_end].to_vec(),
            system_use: record[system_use_start..].to_vec(),
        })
    }

    /// Creates ISO9660 directory record bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let id_len = self.identifier.len();
        let pad_len = (id_len + 1) % 2;
        let record_len = DIR_RECORD_HEADER_LEN + id_len + pad_len + self.system_use.len();

        let mut record = vec![0u8; record_len];
        record[0] = record_len as u8;
        record[1] = 0; // Extended attribute length
        record[2..6].copy_from_slice(&self.lba.to_le_bytes());
        record[6..10].copy_from_slice(&self.lba.to_be_bytes());
        record[10..14].copy_from_slice(&self.size.to_le_bytes());
        record[14..18].copy_from_slice(&self.size.to_be_bytes());
        record[18..25].copy_from_slice(&self.recorded);
        record[25] = self.flags;
        record[28..30].copy_from_slice(&1u16.to_le_bytes());
        record[30..32].copy_from_slice(&1u16.to_be_bytes());
        record[32] = id_len as u8;
        record[DIR_RECORD_HEADER_LEN..DIR_RECORD_HEADER_LEN + id_len]
            .copy_from_slice(&self.identifier);
        let su_start = DIR_RECORD_HEADER_LEN + id_len + pad_len;
        record[su_start..].copy_from_slice(&self.system_use);
        record
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// `.` or `..` pseudo-entry.
    pub fn is_pseudo(&self) -> bool {
        self.identifier == [0u8] || self.identifier == [1u8]
    }

    /// Name of a pseudo-entry, if this is one.
    pub fn pseudo_name(&self) -> Option<&'static str> {
        match self.identifier.as_slice() {
            [0] => Some("."),
            [1] => Some(".."),
            _ => None,
        }
    }

    /// Primary-tree identifier without the `;N` version and trailing dot.
    pub fn primary_name(&self) -> String {
        let raw = String::from_utf8_lossy(&self.identifier);
        strip_version(&raw)
    }

    /// Joliet identifier, stored as UCS-2 big endian.
    pub fn joliet_name(&self) -> String {
        let units: Vec<u16> = self
            .identifier
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        strip_version(&String::from_utf16_lossy(&units))
    }

    /// Rock Ridge alternate name assembled from all `NM` entries.
    pub fn rock_ridge_name(&self) -> Option<String> {
        let mut name = Vec::new();
        let mut found = false;
        for (signature, body) in susp_entries(&self.system_use) {
            if &signature == RR_NAME_SIGNATURE && !body.is_empty() {
                let flags = body[0];
                name.extend_from_slice(&body[1..]);
                found = true;
                if flags & RR_NAME_CONTINUE == 0 {
                    break;
                }
            }
        }
        found.then(|| String::from_utf8_lossy(&name).into_owned())
    }

    /// Whether the system use area carries any Rock Ridge / SUSP entry.
    pub fn has_rock_ridge(&self) -> bool {
        susp_entries(&self.system_use)
            .any(|(signature, _)| RR_SIGNATURES.iter().any(|s| **s == signature))
    }

    /// Decoded recording timestamp; undecodable dates map to the Unix epoch.
    pub fn recorded_at(&self) -> OffsetDateTime {
        decode_recorded(&self.recorded).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Iterates `(signature, body)` pairs of a SUSP system use area. The body excludes the
/// four-byte entry header.
fn susp_entries(area: &[u8]) -> impl Iterator<Item = ([u8; 2], &[u8])> + '_ {
    let mut pos = 0usize;
    std::iter::from_fn(move || {
        if pos + 4 > area.len() {
            return None;
        }
        let len = area[pos + 2] as usize;
        if len < 4 || pos + len > area.len() {
            return None;
        }
        let entry = ([area[pos], area[pos + 1]], &area[pos + 4..pos + len]);
        pos += len;
        Some(entry)
    })
}

fn strip_version(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or(raw);
    let base = base.strip_suffix('.').unwrap_or(base);
    base.to_string()
}

fn decode_recorded(bytes: &[u8; 7]) -> Option<OffsetDateTime> {
    if bytes.iter().all(|&b| b == 0) {
        return None;
    }
    let month = Month::try_from(bytes[1]).ok()?;
    let date = Date::from_calendar_date(1900 + bytes[0] as i32, month, bytes[2]).ok()?;
    let time = Time::from_hms(bytes[3], bytes[4], bytes[5]).ok()?;
    let offset = UtcOffset::from_whole_seconds(bytes[6] as i8 as i32 * 15 * 60).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_offset(offset))
}

fn encode_recorded(at: OffsetDateTime) -> [u8; 7] {
    let year = (at.year() - 1900).clamp(0, 255) as u8;
    [
        year,
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        (at.offset().whole_minutes() / 15) as i8 as u8,
    ]
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

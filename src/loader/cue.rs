// discedit/src/loader/cue.rs
//! CUE sheet parsing and the flat track tree built from it.

use std::fs;
use std::io;
use std::path::Path;

use log::{debug, info, warn};
use regex::Regex;
use time::OffsetDateTime;

use crate::loader::LoadedImage;
use crate::tree::{DataOrigin, DiscTree};
use crate::utils::{CD_FRAME_SIZE, CD_FRAMES_PER_SECOND, modified_time};

/// Volume id used when the sheet has no disc-level `TITLE`.
pub const DEFAULT_CUE_VOLUME_ID: &str = "CUE_SHEET";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CueTrack {
    pub number: u32,
    pub mode: String,
    /// First frame of the track's data (`INDEX 01`).
    pub start_frame: u64,
}

impl CueTrack {
    /// Byte offset of the track inside the BIN file.
    pub fn offset(&self) -> u64 {
        self.start_frame * CD_FRAME_SIZE
    }

    pub fn node_name(&self) -> String {
        format!("TRACK_{:02}.bin", self.number)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CueSheet {
    pub title: Option<String>,
    pub file: Option<String>,
    pub tracks: Vec<CueTrack>,
}

struct PendingTrack {
    number: u32,
    mode: String,
    index01: Option<u64>,
    first_index: Option<u64>,
}

impl PendingTrack {
    fn finish(self) -> io::Result<CueTrack> {
        let start_frame = self.index01.or(self.first_index).ok_or_else(|| {
            invalid(format!("Track {:02} has no INDEX entry", self.number))
        })?;
        Ok(CueTrack {
            number: self.number,
            mode: self.mode,
            start_frame,
        })
    }
}

/// Parses CUE text. Keywords are matched case-insensitively; unknown lines are ignored.
pub fn parse_cue(text: &str) -> io::Result<CueSheet> {
    let file_re = cue_regex(r#"(?i)^\s*FILE\s+(?:"([^"]*)"|(\S+))"#)?;
    let title_re = cue_regex(r#"(?i)^\s*TITLE\s+"([^"]*)""#)?;
    let track_re = cue_regex(r"(?i)^\s*TRACK\s+(\d+)\s+(\S+)")?;
    let index_re = cue_regex(r"(?i)^\s*INDEX\s+(\d+)\s+(\d+):(\d+):(\d+)")?;

    let mut sheet = CueSheet::default();
    let mut current: Option<PendingTrack> = None;

    for (line_no, line) in text.lines().enumerate() {
        if let Some(caps) = file_re.captures(line) {
            let path = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if sheet.file.is_none() {
                sheet.file = Some(path);
            } else {
                warn!("Ignoring additional FILE '{}' on line {}", path, line_no + 1);
            }
        } else if let Some(caps) = title_re.captures(line) {
            // Only the disc title counts; per-track titles are ignored.
            if current.is_none() && sheet.tracks.is_empty() && sheet.title.is_none() {
                sheet.title = Some(caps[1].to_string());
            }
        } else if let Some(caps) = track_re.captures(line) {
            if let Some(done) = current.take() {
                sheet.tracks.push(done.finish()?);
            }
            current = Some(PendingTrack {
                number: parse_number(&caps[1], line_no)? as u32,
                mode: caps[2].to_string(),
                index01: None,
                first_index: None,
            });
        } else if let Some(caps) = index_re.captures(line) {
            let Some(track) = current.as_mut() else {
                warn!("INDEX outside of a TRACK on line {}", line_no + 1);
                continue;
            };
            let index = parse_number(&caps[1], line_no)?;
            let minutes = parse_number(&caps[2], line_no)?;
            let seconds = parse_number(&caps[3], line_no)?;
            let frames = parse_number(&caps[4], line_no)?;
            if seconds >= 60 || frames >= CD_FRAMES_PER_SECOND {
                return Err(invalid(format!(
                    "Invalid CUE time {}:{}:{} on line {}",
                    minutes,
                    seconds,
                    frames,
                    line_no + 1
                )));
            }
            let position = (minutes * 60 + seconds) * CD_FRAMES_PER_SECOND + frames;
            if index == 1 {
                track.index01 = Some(position);
            }
            track.first_index.get_or_insert(position);
        }
    }
    if let Some(done) = current.take() {
        sheet.tracks.push(done.finish()?);
    }
    Ok(sheet)
}

/// Loads a CUE sheet as one flat file node per track, backed by the companion BIN.
pub fn load_cue(path: &Path) -> io::Result<LoadedImage> {
    info!("Loading CUE sheet {}", path.display());
    let text = fs::read_to_string(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Cannot read CUE sheet {}: {}", path.display(), e),
        )
    })?;
    let sheet = parse_cue(&text)?;

    let bin_name = sheet.file.as_deref().filter(|f| !f.is_empty()).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "CUE sheet does not specify a BIN file",
        )
    })?;
    if sheet.tracks.is_empty() {
        return Err(invalid("CUE sheet lists no tracks"));
    }
    let bin_path = path.parent().unwrap_or_else(|| Path::new("")).join(bin_name);
    let bin_meta = fs::metadata(&bin_path).ok();
    let mtime = bin_meta
        .as_ref()
        .map(modified_time)
        .unwrap_or_else(OffsetDateTime::now_utc);

    let mut tree = DiscTree::new();
    let root = tree.root();
    let mut placed = Vec::with_capacity(sheet.tracks.len());
    for track in &sheet.tracks {
        let origin = DataOrigin::Track {
            bin_path: bin_path.clone(),
            offset: track.offset(),
        };
        let name = track.node_name();
        if tree.find_child(root, &name, true).is_some() {
            return Err(invalid(format!("Duplicate track number {:02}", track.number)));
        }
        let id = tree
            .insert_file(root, &name, origin, 0, mtime)
            .ok_or_else(|| invalid(format!("Cannot place track {:02}", track.number)))?;
        placed.push((id, track.offset()));
    }

    for (i, &(id, offset)) in placed.iter().enumerate() {
        let size = match placed.get(i + 1) {
            Some(&(_, next_offset)) => next_offset.saturating_sub(offset),
            None => match &bin_meta {
                Some(meta) => meta.len().saturating_sub(offset),
                None => {
                    warn!(
                        "BIN file {} is missing; last track size left at 0",
                        bin_path.display()
                    );
                    0
                }
            },
        };
        tree.set_size(id, size);
        debug!("{} at offset {} ({} bytes)", tree.node_path(id), offset, size);
    }
    tree.clear_modified();

    Ok(LoadedImage {
        tree,
        volume_id: sheet
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_CUE_VOLUME_ID.to_string()),
        system_id: None,
    })
}

fn cue_regex(pattern: &str) -> io::Result<Regex> {
    Regex::new(pattern).map_err(|e| io::Error::other(format!("Bad CUE pattern: {}", e)))
}

fn parse_number(digits: &str, line_no: usize) -> io::Result<u64> {
    digits
        .parse::<u64>()
        .map_err(|e| invalid(format!("Bad number '{}' on line {}: {}", digits, line_no + 1, e)))
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

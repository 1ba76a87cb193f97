// discedit/src/loader/mod.rs
//! Source loaders that build a fresh [`DiscTree`] from an existing image.

pub mod cue;
pub mod iso_loader;

use std::io;
use std::path::Path;

use crate::tree::DiscTree;

pub use self::cue::{CueSheet, CueTrack, load_cue, parse_cue};
pub use self::iso_loader::{load_iso, load_volume};

/// A freshly loaded tree plus the identity read from the source.
#[derive(Debug)]
pub struct LoadedImage {
    pub tree: DiscTree,
    pub volume_id: String,
    /// `None` when the source carries no system identifier (CUE sheets).
    pub system_id: Option<String>,
}

/// Whether `path` names a CUE sheet rather than an ISO image.
pub fn is_cue_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cue"))
}

/// Loads `path` with the loader matching its extension.
pub fn load_image(path: &Path) -> io::Result<LoadedImage> {
    if is_cue_path(path) {
        load_cue(path)
    } else {
        load_iso(path)
    }
}

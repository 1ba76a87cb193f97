// discedit/src/iso/mod.rs
pub mod dir_record;
pub mod reader;
pub mod volume_descriptor;

pub use self::reader::{EntryStat, IsoImage, NameScheme, VolumeReader};

//! Edit ISO 9660 images and CUE/BIN discs as a virtual filesystem tree.
//!
//! An image is loaded into a [`DiscTree`] whose file nodes either hold their bytes in
//! memory or point back into the source image or BIN file. Edits happen on the tree;
//! saving writes the tree out to a staging directory and hands it to an external
//! mastering tool (xorriso, genisoimage, mkisofs).

pub mod config;
pub mod history;
pub mod iso;
pub mod loader;
pub mod materialize;
pub mod session;
pub mod synth;
pub mod tree;
pub mod utils;
pub mod worker;

pub use crate::config::EditorConfig;
pub use crate::session::{EditSession, SaveOptions, SaveReport, VolumeDescriptor};
pub use crate::tree::{DataOrigin, DiscNode, DiscTree, NodeId};

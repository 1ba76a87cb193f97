// discedit/src/loader/iso_loader.rs
use std::collections::HashSet;
use std::io;
use std::path::Path;

use log::{debug, info, warn};

use crate::iso::{IsoImage, VolumeReader};
use crate::loader::LoadedImage;
use crate::tree::{DataOrigin, DiscTree, NodeId};

/// Directory nesting deeper than this is treated as a corrupt image.
const MAX_DEPTH: usize = 64;

/// Opens an ISO image and mirrors its whole directory hierarchy.
///
/// File nodes keep a reference to their extent inside `path`; no file data is read here.
pub fn load_iso(path: &Path) -> io::Result<LoadedImage> {
    info!("Loading ISO image {}", path.display());
    let mut image = IsoImage::open(path)?;
    let mut tree = load_volume(&mut image)?;
    tree.set_volume_source(Some(path.to_path_buf()));
    tree.clear_modified();
    info!(
        "Loaded '{}': {} entries, {} bytes",
        image.volume_id(),
        tree.descendant_count(tree.root()),
        tree.total_size(tree.root())
    );
    Ok(LoadedImage {
        tree,
        volume_id: image.volume_id().to_string(),
        system_id: Some(image.system_id().to_string()),
    })
}

/// Builds a tree from any [`VolumeReader`], in the reader's listing order.
pub fn load_volume<V: VolumeReader>(reader: &mut V) -> io::Result<DiscTree> {
    let mut tree = DiscTree::new();
    let root = tree.root();
    let mut visited = HashSet::new();
    walk(reader, &mut tree, root, "/", 0, &mut visited)?;
    tree.clear_modified();
    Ok(tree)
}

fn walk<V: VolumeReader>(
    reader: &mut V,
    tree: &mut DiscTree,
    dir: NodeId,
    path: &str,
    depth: usize,
    visited: &mut HashSet<u32>,
) -> io::Result<()> {
    if depth > MAX_DEPTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Directory nesting exceeds {} levels at {}", MAX_DEPTH, path),
        ));
    }
    for entry in reader.read_dir(path)? {
        if entry.is_pseudo() {
            continue;
        }
        let child_path = if path == "/" {
            format!("/{}", entry.name)
        } else {
            format!("{}/{}", path, entry.name)
        };

        if entry.is_directory {
            if !visited.insert(entry.lba) {
                warn!("Skipping {}: directory extent {} already visited", child_path, entry.lba);
                continue;
            }
            let Some(child) = tree.insert_directory_at(dir, &entry.name, entry.recorded) else {
                warn!("Skipping duplicate directory {}", child_path);
                continue;
            };
            walk(reader, tree, child, &child_path, depth + 1, visited)?;
        } else {
            let origin = DataOrigin::Volume { lba: entry.lba };
            if tree
                .insert_file(dir, &entry.name, origin, entry.size, entry.recorded)
                .is_none()
            {
                warn!("Skipping {}: name collides with a directory", child_path);
                continue;
            }
            debug!("{} -> LBA {} ({} bytes)", child_path, entry.lba, entry.size);
        }
    }
    Ok(())
}

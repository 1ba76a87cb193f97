// discedit/src/materialize.rs
//! Renders the disc tree as real files and directories on the host.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::{debug, info};

use crate::tree::{DiscTree, NodeId};

/// Recreates the whole tree under `staging_dir`, which must already exist.
///
/// Returns the number of file bytes written. The first host I/O failure aborts the run;
/// removing the partial staging directory is up to the caller.
pub fn materialize(tree: &DiscTree, staging_dir: &Path) -> io::Result<u64> {
    if !staging_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Staging directory {} does not exist", staging_dir.display()),
        ));
    }
    let written = write_children(tree, tree.root(), staging_dir)?;
    info!(
        "Materialized {} entries ({} bytes) into {}",
        tree.descendant_count(tree.root()),
        written,
        staging_dir.display()
    );
    Ok(written)
}

/// Writes a single node to `host_path`: a file's bytes, or a directory and everything
/// below it. Missing parent directories are created.
pub fn extract(tree: &DiscTree, node: NodeId, host_path: &Path) -> io::Result<u64> {
    if !tree.contains(node) {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Node {:?} does not exist", node),
        ));
    }
    if tree.is_directory(node) {
        fs::create_dir_all(host_path)?;
        write_children(tree, node, host_path)
    } else {
        if let Some(parent) = host_path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_file(tree, node, host_path)
    }
}

fn write_children(tree: &DiscTree, dir: NodeId, host_dir: &Path) -> io::Result<u64> {
    let mut written = 0;
    for &child in tree.children(dir) {
        let Some(node) = tree.get(child) else {
            continue;
        };
        let target = host_dir.join(node.name());
        if node.is_directory() {
            fs::create_dir(&target).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Cannot create directory {}: {}", target.display(), e),
                )
            })?;
            written += write_children(tree, child, &target)?;
        } else {
            written += write_file(tree, child, &target)?;
        }
    }
    Ok(written)
}

fn write_file(tree: &DiscTree, node: NodeId, target: &Path) -> io::Result<u64> {
    let expected = tree.get(node).map_or(0, |n| n.size());
    let file = File::create(target).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Cannot create file {}: {}", target.display(), e),
        )
    })?;
    let mut writer = BufWriter::new(file);
    let mut source = tree.open_data(node)?;
    let copied = io::copy(&mut source, &mut writer)?;
    writer.flush()?;
    if copied != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "Short read for {}: wrote {} of {} bytes",
                tree.node_path(node),
                copied,
                expected
            ),
        ));
    }
    debug!("Wrote {} ({} bytes)", target.display(), copied);
    Ok(copied)
}

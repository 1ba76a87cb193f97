// discedit/src/session.rs
//! One editing session: the disc tree, its target identity and the save pipeline.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::config::{DefaultsConfig, EditorConfig};
use crate::history::{Edit, EditHistory};
use crate::loader::load_image;
use crate::materialize::materialize;
use crate::synth::{MasteringRequest, MasteringTool, synthesize};
use crate::tree::{DataOrigin, DiscTree, NodeId};
use crate::utils::{checksum_file, modified_time, read_file_from_path};

/// Identity written into the output image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub system_id: String,
    pub volume_id: String,
}

impl VolumeDescriptor {
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            system_id: defaults.system_id.clone(),
            volume_id: defaults.volume_id.clone(),
        }
    }
}

/// Feature switches for a save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveOptions {
    pub use_udf: bool,
    pub make_hybrid: bool,
    /// Compute a CRC32 of the produced image.
    pub checksum: bool,
}

impl SaveOptions {
    pub fn from_defaults(defaults: &DefaultsConfig) -> Self {
        Self {
            use_udf: defaults.use_udf,
            make_hybrid: defaults.make_hybrid,
            checksum: defaults.checksum,
        }
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self::from_defaults(&DefaultsConfig::default())
    }
}

/// Outcome of a successful save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveReport {
    pub output: PathBuf,
    pub checksum: Option<u32>,
    /// Whatever the mastering tool printed on stderr.
    pub diagnostics: String,
}

#[derive(Debug)]
pub struct EditSession {
    tree: DiscTree,
    volume: VolumeDescriptor,
    current_path: Option<PathBuf>,
    boot_image: Option<PathBuf>,
    efi_boot_image: Option<PathBuf>,
    history: EditHistory,
    config: EditorConfig,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditSession {
    /// A session holding a fresh, unmodified tree.
    pub fn new(config: EditorConfig) -> Self {
        Self {
            tree: DiscTree::new(),
            volume: VolumeDescriptor::from_defaults(&config.defaults),
            current_path: None,
            boot_image: None,
            efi_boot_image: None,
            history: EditHistory::default(),
            config,
        }
    }

    /// Opens `path` in a new session.
    pub fn load(path: &Path, config: EditorConfig) -> io::Result<Self> {
        let mut session = Self::new(config);
        session.open(path)?;
        Ok(session)
    }

    pub fn tree(&self) -> &DiscTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn volume(&self) -> &VolumeDescriptor {
        &self.volume
    }

    /// The image this session was loaded from or last saved to.
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn boot_image(&self) -> Option<&Path> {
        self.boot_image.as_deref()
    }

    pub fn efi_boot_image(&self) -> Option<&Path> {
        self.efi_boot_image.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.tree.is_modified()
    }

    /// Discards everything and starts an empty image.
    pub fn new_image(&mut self) {
        self.tree = DiscTree::new();
        self.history.reset();
        self.volume = VolumeDescriptor::from_defaults(&self.config.defaults);
        self.current_path = None;
        self.boot_image = None;
        self.efi_boot_image = None;
    }

    /// Replaces the tree with the contents of an ISO image or CUE sheet.
    ///
    /// On failure the session is left holding a fresh empty image.
    pub fn open(&mut self, path: &Path) -> io::Result<()> {
        self.new_image();
        let loaded = match load_image(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                return Err(e);
            }
        };
        self.tree = loaded.tree;
        self.volume.volume_id = loaded.volume_id;
        if let Some(system_id) = loaded.system_id {
            self.volume.system_id = system_id;
        }
        self.current_path = Some(path.to_path_buf());
        info!("Opened {} as '{}'", path.display(), self.volume.volume_id);
        Ok(())
    }

    /// Materializes the tree and runs the mastering tool to produce `output`.
    ///
    /// The tree is never touched; on failure the modified flag and current path are too.
    pub fn save(&mut self, output: &Path, options: &SaveOptions) -> io::Result<SaveReport> {
        if self.would_overwrite_source(output) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{} is the image being edited; save to a different path",
                    output.display()
                ),
            ));
        }
        let tool = MasteringTool::locate(&self.config.mastering)?;
        let staging = tempfile::Builder::new().prefix("disc-edit-").tempdir()?;
        materialize(&self.tree, staging.path())?;

        let request = MasteringRequest {
            output: output.to_path_buf(),
            volume_id: self.volume.volume_id.clone(),
            system_id: self.volume.system_id.clone(),
            use_udf: options.use_udf,
            make_hybrid: options.make_hybrid,
            ..Default::default()
        };
        let result = synthesize(
            &tool,
            staging.path(),
            request,
            self.boot_image.as_deref(),
            self.efi_boot_image.as_deref(),
        )?;
        let checksum = if options.checksum {
            Some(checksum_file(output)?)
        } else {
            None
        };

        self.tree.clear_modified();
        self.current_path = Some(output.to_path_buf());
        if let Some(crc) = checksum {
            info!("Saved {} (crc32 {:08x})", output.display(), crc);
        } else {
            info!("Saved {}", output.display());
        }
        Ok(SaveReport {
            output: output.to_path_buf(),
            checksum,
            diagnostics: result.stderr,
        })
    }

    fn would_overwrite_source(&self, output: &Path) -> bool {
        let Some(source) = self.tree.volume_source() else {
            return false;
        };
        match (fs::canonicalize(source), fs::canonicalize(output)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Reads a host file into memory and adds it to `target_dir`, replacing a file of
    /// the same name. The replaced file comes back on undo.
    pub fn add_file(&mut self, host_path: &Path, target_dir: NodeId) -> io::Result<NodeId> {
        self.require_directory(target_dir)?;
        let name = host_name(host_path)?;
        let (origin, size, mtime) = read_host_file(host_path)?;

        let replaced = match self.tree.find_child(target_dir, &name, true) {
            Some(existing) if !self.tree.is_directory(existing) => self
                .tree
                .detach(existing)
                .map(|index| (existing, index)),
            _ => None,
        };
        let Some(id) = self.tree.insert_file(target_dir, &name, origin, size, mtime) else {
            if let Some((existing, index)) = replaced {
                self.tree.reattach(existing, index);
            }
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("A folder named '{}' already exists", name),
            ));
        };
        self.record_added(id, format!("Add file '{}'", name), replaced);
        Ok(id)
    }

    /// Adds an empty folder. `None` if the name is taken or invalid.
    pub fn add_folder(&mut self, name: &str, target_dir: NodeId) -> Option<NodeId> {
        if !self.tree.is_attached(target_dir) {
            return None;
        }
        let id = self.tree.insert_directory(target_dir, name)?;
        self.record_added(id, format!("Add folder '{}'", name), None);
        Some(id)
    }

    /// Mirrors a host directory (named after its last path segment) under `target_dir`.
    ///
    /// Returns `Ok(None)` when a sibling already uses that name. A read error part way
    /// through undoes the import.
    pub fn import_directory(
        &mut self,
        host_dir: &Path,
        target_dir: NodeId,
    ) -> io::Result<Option<NodeId>> {
        self.require_directory(target_dir)?;
        if !host_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", host_dir.display()),
            ));
        }
        let name = host_name(host_dir)?;
        let was_modified = self.tree.is_modified();
        let mtime = modified_time(&fs::metadata(host_dir)?);
        let Some(top) = self.tree.insert_directory_at(target_dir, &name, mtime) else {
            warn!("Import of {} skipped: '{}' already exists", host_dir.display(), name);
            return Ok(None);
        };

        if let Err(e) = self.import_tree(host_dir, top) {
            self.tree.remove(top);
            if !was_modified {
                self.tree.clear_modified();
            }
            return Err(e);
        }
        info!(
            "Imported {} ({} entries)",
            host_dir.display(),
            self.tree.descendant_count(top)
        );
        self.record_added(top, format!("Import folder '{}'", name), None);
        Ok(Some(top))
    }

    fn import_tree(&mut self, host_dir: &Path, top: NodeId) -> io::Result<()> {
        let mut nodes: HashMap<PathBuf, NodeId> = HashMap::new();
        nodes.insert(host_dir.to_path_buf(), top);

        for entry in WalkDir::new(host_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let path = entry.path();
            let Some(&parent) = path.parent().and_then(|p| nodes.get(p)) else {
                // Parent was skipped as a duplicate; so is everything below it.
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();
            if file_type.is_dir() {
                let mtime = modified_time(&entry.metadata().map_err(io::Error::from)?);
                match self.tree.insert_directory_at(parent, &name, mtime) {
                    Some(id) => {
                        nodes.insert(path.to_path_buf(), id);
                    }
                    None => warn!("Skipping duplicate folder {}", path.display()),
                }
            } else if file_type.is_file() {
                let (origin, size, mtime) = read_host_file(path)?;
                if self.tree.insert_file(parent, &name, origin, size, mtime).is_none() {
                    warn!("Skipping {}: a folder already uses the name", path.display());
                }
            } else {
                debug!("Skipping {}: not a regular file", path.display());
            }
        }
        Ok(())
    }

    /// Removes a node and its subtree. `false` for the root.
    ///
    /// The subtree is kept aside so the removal can be undone.
    pub fn remove(&mut self, node: NodeId) -> bool {
        if node == self.tree.root() || !self.tree.is_attached(node) {
            warn!("Cannot remove root node or node with no parent.");
            return false;
        }
        let description = match self.tree.get(node) {
            Some(entry) if entry.is_directory() => format!("Remove folder '{}'", entry.name()),
            Some(entry) => format!("Remove file '{}'", entry.name()),
            None => return false,
        };
        let Some(index) = self.tree.detach(node) else {
            return false;
        };
        debug!("Removed {}", description);
        self.history.record(
            &mut self.tree,
            Edit::Removed {
                node,
                index,
                description,
            },
        );
        true
    }

    pub fn rename(&mut self, node: NodeId, new_name: &str) -> bool {
        if !self.tree.is_attached(node) {
            return false;
        }
        let Some(old_name) = self.tree.get(node).map(|n| n.name().to_string()) else {
            return false;
        };
        if !self.tree.rename(node, new_name) {
            return false;
        }
        if old_name != new_name {
            self.history.record(
                &mut self.tree,
                Edit::Renamed {
                    node,
                    old_name,
                    new_name: new_name.to_string(),
                },
            );
        }
        true
    }

    /// Reverts the last structural edit; returns what was undone.
    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.tree)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.tree)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.history.undo_description()
    }

    pub fn redo_description(&self) -> Option<String> {
        self.history.redo_description()
    }

    fn record_added(
        &mut self,
        node: NodeId,
        description: String,
        replaced: Option<(NodeId, usize)>,
    ) {
        let index = self
            .tree
            .parent(node)
            .and_then(|parent| self.tree.children(parent).iter().position(|&c| c == node))
            .unwrap_or(0);
        self.history.record(
            &mut self.tree,
            Edit::Added {
                node,
                index,
                replaced,
                description,
            },
        );
    }

    pub fn set_volume_descriptor(&mut self, volume: VolumeDescriptor) {
        if self.volume != volume {
            self.volume = volume;
            self.tree.mark_modified();
        }
    }

    pub fn set_boot_image(&mut self, path: Option<PathBuf>) {
        if self.boot_image != path {
            self.boot_image = path;
            self.tree.mark_modified();
        }
    }

    pub fn set_efi_boot_image(&mut self, path: Option<PathBuf>) {
        if self.efi_boot_image != path {
            self.efi_boot_image = path;
            self.tree.mark_modified();
        }
    }

    /// Names that break ISO 9660 Level 1 (8.3, `A-Z 0-9 _`), deduplicated and sorted.
    pub fn non_compliant_names(&self) -> Vec<String> {
        let Ok(level1) = Regex::new(r"^[A-Z0-9_]{1,8}(?:\.[A-Z0-9_]{0,3})?$") else {
            return Vec::new();
        };
        let mut names: Vec<String> = self
            .tree
            .descendants(self.tree.root())
            .into_iter()
            .filter_map(|(id, _)| self.tree.get(id))
            .map(|node| node.name().to_string())
            .filter(|name| !level1.is_match(&name.to_uppercase()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn require_directory(&self, node: NodeId) -> io::Result<()> {
        if self.tree.is_directory(node) && self.tree.is_attached(node) {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Target is not a directory in the disc tree",
            ))
        }
    }
}

fn read_host_file(path: &Path) -> io::Result<(DataOrigin, u64, OffsetDateTime)> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is a directory", path.display()),
        ));
    }
    let content = read_file_from_path(path)?;
    let size = content.len() as u64;
    Ok((DataOrigin::Pending(content), size, modified_time(&metadata)))
}

fn host_name(path: &Path) -> io::Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no final path segment", path.display()),
            )
        })
}

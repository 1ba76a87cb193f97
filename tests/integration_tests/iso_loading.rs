use std::{fs, io};

use discedit::materialize::{extract, materialize};
use discedit::{DataOrigin, EditSession, EditorConfig};
use tempfile::tempdir;

use crate::integration_tests::common::{
    GRUB_CFG_TEXT, README_TEXT, kernel_bytes, write_fixture_iso,
};

#[test]
fn test_load_rock_ridge_image() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let iso_path = temp_dir.path().join("fixture.iso");
    write_fixture_iso(&iso_path, true)?;

    let session = EditSession::load(&iso_path, EditorConfig::default())?;
    assert_eq!(session.volume().volume_id, "FIXTURE_VOL");
    assert_eq!(session.volume().system_id, "LINUX");
    assert_eq!(session.current_path(), Some(iso_path.as_path()));
    assert!(!session.is_modified());

    let tree = session.tree();
    let root = tree.root();
    // Listing order is kept; the pseudo-entries are not nodes.
    let names: Vec<&str> = tree
        .children(root)
        .iter()
        .filter_map(|&id| tree.get(id))
        .map(|node| node.name())
        .collect();
    assert_eq!(names, ["boot", "readme.txt"]);
    assert_eq!(tree.descendant_count(root), 5);

    let kernel = tree.find_path("/boot/kernel.bin").unwrap();
    let node = tree.get(kernel).unwrap();
    assert_eq!(node.size(), 3000);
    assert_eq!(node.origin(), Some(&DataOrigin::Volume { lba: 24 }));
    assert_eq!(tree.read_data(kernel)?, kernel_bytes());

    let cfg = tree.find_path("/boot/grub/grub.cfg").unwrap();
    assert_eq!(tree.node_path(cfg), "/boot/grub/grub.cfg");
    assert_eq!(tree.read_data(cfg)?, GRUB_CFG_TEXT);
    Ok(())
}

#[test]
fn test_load_primary_names_without_rock_ridge() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let iso_path = temp_dir.path().join("plain.iso");
    write_fixture_iso(&iso_path, false)?;

    let session = EditSession::load(&iso_path, EditorConfig::default())?;
    let tree = session.tree();
    let readme = tree.find_path("/README.TXT").unwrap();
    assert_eq!(tree.get(readme).unwrap().name(), "README.TXT");
    assert_eq!(tree.read_data(readme)?, README_TEXT);
    assert!(session.non_compliant_names().is_empty());
    Ok(())
}

#[test]
fn test_missing_image_resets_session() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let mut session = EditSession::default();
    let root = session.root();
    session.add_folder("scratch", root).unwrap();

    let err = session.open(&temp_dir.path().join("nope.iso")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert!(session.tree().children(session.root()).is_empty());
    assert!(!session.is_modified());
    assert!(session.current_path().is_none());
    Ok(())
}

#[test]
fn test_edit_loaded_image_then_materialize() -> io::Result<()> {
    let temp_dir = tempdir()?;
    println!("Temp dir for materialize test: {:?}", temp_dir.path());
    let iso_path = temp_dir.path().join("fixture.iso");
    write_fixture_iso(&iso_path, true)?;
    let extra = temp_dir.path().join("notes.md");
    fs::write(&extra, b"# added after load\n")?;

    let mut session = EditSession::load(&iso_path, EditorConfig::default())?;
    let boot = session.tree().find_path("/boot").unwrap();
    let kernel = session.tree().find_path("/boot/kernel.bin").unwrap();
    assert!(session.remove(kernel));
    session.add_file(&extra, boot)?;
    assert!(session.is_modified());

    // Volume-resident, then pending content, under one staging root.
    let staging = temp_dir.path().join("staging");
    fs::create_dir(&staging)?;
    let written = materialize(session.tree(), &staging)?;
    assert_eq!(
        written,
        (README_TEXT.len() + GRUB_CFG_TEXT.len() + b"# added after load\n".len()) as u64
    );
    assert_eq!(fs::read(staging.join("readme.txt"))?, README_TEXT);
    assert_eq!(fs::read(staging.join("boot/grub/grub.cfg"))?, GRUB_CFG_TEXT);
    assert_eq!(fs::read(staging.join("boot/notes.md"))?, b"# added after load\n");
    assert!(!staging.join("boot/kernel.bin").exists());
    Ok(())
}

#[test]
fn test_extract_from_image() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let iso_path = temp_dir.path().join("fixture.iso");
    write_fixture_iso(&iso_path, true)?;
    let session = EditSession::load(&iso_path, EditorConfig::default())?;
    let tree = session.tree();

    let out = temp_dir.path().join("out");
    let boot = tree.find_path("/BOOT").unwrap();
    extract(tree, boot, &out.join("boot"))?;
    assert_eq!(fs::read(out.join("boot/kernel.bin"))?, kernel_bytes());
    assert_eq!(fs::read(out.join("boot/grub/grub.cfg"))?, GRUB_CFG_TEXT);
    Ok(())
}

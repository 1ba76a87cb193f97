use std::{fs, io};

use discedit::materialize::materialize;
use discedit::{DataOrigin, EditSession, EditorConfig};
use tempfile::tempdir;

use crate::integration_tests::common::write_two_track_cue;

#[test]
fn test_two_track_cue_offsets_and_sizes() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let (cue_path, bin_path) = write_two_track_cue(temp_dir.path())?;
    let bin_len = fs::metadata(&bin_path)?.len();

    let session = EditSession::load(&cue_path, EditorConfig::default())?;
    assert_eq!(session.volume().volume_id, "Fixture Album");
    // CUE sheets carry no system id; the configured default stays.
    assert_eq!(session.volume().system_id, "DISC_EDIT");
    assert!(!session.is_modified());

    let tree = session.tree();
    let root = tree.root();
    assert_eq!(tree.children(root).len(), 2);
    let track1 = tree.get(tree.children(root)[0]).unwrap();
    let track2 = tree.get(tree.children(root)[1]).unwrap();
    assert_eq!(track1.name(), "TRACK_01.bin");
    assert_eq!(track2.name(), "TRACK_02.bin");

    assert_eq!(
        track1.origin(),
        Some(&DataOrigin::Track {
            bin_path: bin_path.clone(),
            offset: 0
        })
    );
    assert_eq!(
        track2.origin(),
        Some(&DataOrigin::Track {
            bin_path: bin_path.clone(),
            offset: 150 * 2352
        })
    );
    assert_eq!(track1.size(), 352_800);
    assert_eq!(track1.size() + track2.size(), bin_len);
    Ok(())
}

#[test]
fn test_track_bytes_come_from_bin() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let (cue_path, _) = write_two_track_cue(temp_dir.path())?;
    let session = EditSession::load(&cue_path, EditorConfig::default())?;

    let staging = temp_dir.path().join("staging");
    fs::create_dir(&staging)?;
    materialize(session.tree(), &staging)?;

    let track1 = fs::read(staging.join("TRACK_01.bin"))?;
    let track2 = fs::read(staging.join("TRACK_02.bin"))?;
    assert!(track1.iter().all(|&b| b == 0x11));
    assert!(track2.iter().all(|&b| b == 0x22));
    assert_eq!(track2.len(), 200_000);
    Ok(())
}

#[test]
fn test_cue_without_file_fails_and_resets() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let cue_path = temp_dir.path().join("broken.cue");
    fs::write(&cue_path, "TITLE \"No Bin\"\nTRACK 01 AUDIO\nINDEX 01 00:00:00\n")?;

    let mut session = EditSession::default();
    let root = session.root();
    session.add_folder("keep-me-not", root).unwrap();
    assert!(session.open(&cue_path).is_err());
    assert!(session.tree().children(session.root()).is_empty());
    assert!(session.current_path().is_none());

    let err = session.open(&temp_dir.path().join("missing.cue")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    Ok(())
}

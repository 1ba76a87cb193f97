use std::time::{Duration, Instant};
use std::{fs, io};

use discedit::worker::{join, spawn_save};
use discedit::{EditSession, SaveOptions};
use tempfile::tempdir;

use crate::integration_tests::common::{
    README_TEXT, config_with_tool, fake_mastering_tool, read_args, write_fixture_iso,
    write_script,
};

#[test]
fn test_save_runs_tool_and_updates_session() -> io::Result<()> {
    let temp_dir = tempdir()?;
    println!("Temp dir for save test: {:?}", temp_dir.path());
    let tool = fake_mastering_tool(temp_dir.path())?;
    let iso_path = temp_dir.path().join("fixture.iso");
    write_fixture_iso(&iso_path, true)?;
    let bios = temp_dir.path().join("isolinux.bin");
    let mut boot_sector = vec![0u8; 512];
    boot_sector[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
    fs::write(&bios, &boot_sector)?;
    let efi = temp_dir.path().join("efiboot.img");
    fs::write(&efi, vec![0u8; 4096])?;

    let mut session = EditSession::load(&iso_path, config_with_tool(&tool, 30))?;
    session.set_boot_image(Some(bios.clone()));
    session.set_efi_boot_image(Some(efi.clone()));
    assert!(session.is_modified());

    let output = temp_dir.path().join("rebuilt.iso");
    let options = SaveOptions {
        use_udf: true,
        make_hybrid: true,
        checksum: true,
    };
    let report = session.save(&output, &options)?;

    // 1. Session state follows the successful save
    assert!(!session.is_modified());
    assert_eq!(session.current_path(), Some(output.as_path()));
    assert_eq!(report.output, output);
    assert_eq!(report.checksum, Some(crc32fast::hash(b"FAKE ISO IMAGE")));
    assert!(report.diagnostics.contains("warning: using defaults"));

    // 2. Argument grammar
    let args = read_args(temp_dir.path())?;
    assert_eq!(
        &args[..9],
        [
            "-o",
            output.to_str().unwrap(),
            "-R",
            "-J",
            "-V",
            "FIXTURE_VOL",
            "-sysid",
            "LINUX",
            "-udf"
        ]
    );
    assert_eq!(
        &args[9..16],
        [
            "-b",
            "isolinux.bin",
            "-no-emul-boot",
            "-eltorito-boot",
            "efiboot.img",
            "-no-emul-boot",
            "-isohybrid-gpt-basdat"
        ]
    );
    assert!(!args.contains(&"-isohybrid-mbr".to_string()));
    assert_eq!(args.len(), 17);

    // 3. Staging directory held the tree plus both boot images
    let staged = temp_dir.path().join("staged");
    assert_eq!(fs::read(staged.join("readme.txt"))?, README_TEXT);
    assert!(staged.join("boot/grub/grub.cfg").is_file());
    assert_eq!(fs::read(staged.join("isolinux.bin"))?, boot_sector);
    assert!(staged.join("efiboot.img").is_file());
    Ok(())
}

#[test]
fn test_failing_tool_leaves_session_unchanged() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let tool = write_script(
        &temp_dir.path().join("broken-mkisofs"),
        "echo 'broken-mkisofs: bad volume id' >&2\nexit 3\n",
    )?;
    let host = temp_dir.path().join("data.txt");
    fs::write(&host, b"payload")?;

    let mut session = EditSession::new(config_with_tool(&tool, 30));
    let root = session.root();
    session.add_file(&host, root)?;

    let err = session
        .save(&temp_dir.path().join("out.iso"), &SaveOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
    let message = err.to_string();
    assert!(message.contains("exit code 3"), "{}", message);
    assert!(message.contains("bad volume id"), "{}", message);

    assert!(session.is_modified());
    assert!(session.current_path().is_none());
    assert_eq!(session.tree().descendant_count(root), 1);
    Ok(())
}

#[test]
fn test_hanging_tool_is_killed_after_timeout() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let tool = write_script(&temp_dir.path().join("slow-mkisofs"), "exec sleep 30\n")?;

    let session = EditSession::new(config_with_tool(&tool, 1));
    let handle = spawn_save(session, temp_dir.path().join("out.iso"), SaveOptions::default());
    let (session, result) = join(handle)?;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(session.current_path().is_none());
    Ok(())
}

#[test]
fn test_timeout_returns_while_tool_children_linger() -> io::Result<()> {
    let temp_dir = tempdir()?;
    // No `exec`: the shell is killed but its `sleep` child keeps the output pipes open.
    let tool = write_script(
        &temp_dir.path().join("wrapped-mkisofs"),
        "echo 'starting' >&2\nsleep 8\n",
    )?;

    let mut session = EditSession::new(config_with_tool(&tool, 1));
    let started = Instant::now();
    let err = session
        .save(&temp_dir.path().join("out.iso"), &SaveOptions::default())
        .unwrap_err();
    let took = started.elapsed();

    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(took < Duration::from_secs(4), "save took {:?}", took);
    assert!(session.current_path().is_none());
    Ok(())
}

#[test]
fn test_without_hybrid_or_efi_no_boot_arguments() -> io::Result<()> {
    let temp_dir = tempdir()?;
    let tool = fake_mastering_tool(temp_dir.path())?;
    let mut session = EditSession::new(config_with_tool(&tool, 30));
    let root = session.root();
    session.add_folder("empty", root).unwrap();

    let output = temp_dir.path().join("plain.iso");
    let options = SaveOptions {
        use_udf: false,
        make_hybrid: false,
        checksum: false,
    };
    let report = session.save(&output, &options)?;
    assert_eq!(report.checksum, None);

    let args = read_args(temp_dir.path())?;
    assert_eq!(&args[4..8], ["-V", "NEW_ISO", "-sysid", "DISC_EDIT"]);
    assert_eq!(args.len(), 9);
    assert!(temp_dir.path().join("staged/empty").is_dir());
    Ok(())
}

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use discedit::EditorConfig;
use discedit::iso::dir_record::{FLAG_DIRECTORY, IsoDirEntry};
use discedit::iso::volume_descriptor::{PrimaryVolumeDescriptor, terminator_sector};
use discedit::utils::ISO_SECTOR_SIZE;

pub const README_TEXT: &[u8] = b"Hello from the fixture image\n";
pub const GRUB_CFG_TEXT: &[u8] = b"set timeout=5\nmenuentry 'Fixture' { linux /boot/kernel.bin }\n";

const ROOT_LBA: u32 = 20;
const BOOT_LBA: u32 = 21;
const GRUB_LBA: u32 = 22;
const README_LBA: u32 = 23;
const KERNEL_LBA: u32 = 24;
const KERNEL_SIZE: usize = 3000;
const GRUB_CFG_LBA: u32 = 26;
const TOTAL_SECTORS: u32 = 27;

/// Kernel payload spans two sectors so reads must honour the byte length.
pub fn kernel_bytes() -> Vec<u8> {
    (0..KERNEL_SIZE).map(|i| (i % 251) as u8).collect()
}

/// Writes a small ISO 9660 image:
///
/// ```text
/// /README.TXT
/// /BOOT/KERNEL.BIN
/// /BOOT/GRUB/GRUB.CFG
/// ```
///
/// With `rock_ridge` set, every record also carries a lower-case `NM` name.
pub fn write_fixture_iso(path: &Path, rock_ridge: bool) -> io::Result<()> {
    let sector = ISO_SECTOR_SIZE as u32;
    let mut image = vec![0u8; TOTAL_SECTORS as usize * ISO_SECTOR_SIZE];

    let named = |entry: IsoDirEntry, rr: &str| {
        if rock_ridge {
            entry.with_rock_ridge_name(rr)
        } else {
            entry
        }
    };
    let dir = |name: &str, lba: u32| IsoDirEntry::new(name, lba, sector, FLAG_DIRECTORY);

    let root = dir(".", ROOT_LBA);
    let pvd = PrimaryVolumeDescriptor {
        system_id: "LINUX".to_string(),
        volume_id: "FIXTURE_VOL".to_string(),
        total_sectors: TOTAL_SECTORS,
        logical_block_size: ISO_SECTOR_SIZE as u16,
        root: root.clone(),
    };
    put(&mut image, 16, &pvd.to_sector());
    put(&mut image, 17, &terminator_sector());

    put_dir(
        &mut image,
        ROOT_LBA,
        &[
            root,
            dir("..", ROOT_LBA),
            named(dir("BOOT", BOOT_LBA), "boot"),
            named(
                IsoDirEntry::new("README.TXT", README_LBA, README_TEXT.len() as u32, 0),
                "readme.txt",
            ),
        ],
    );
    put_dir(
        &mut image,
        BOOT_LBA,
        &[
            dir(".", BOOT_LBA),
            dir("..", ROOT_LBA),
            named(dir("GRUB", GRUB_LBA), "grub"),
            named(
                IsoDirEntry::new("KERNEL.BIN", KERNEL_LBA, KERNEL_SIZE as u32, 0),
                "kernel.bin",
            ),
        ],
    );
    put_dir(
        &mut image,
        GRUB_LBA,
        &[
            dir(".", GRUB_LBA),
            dir("..", BOOT_LBA),
            named(
                IsoDirEntry::new("GRUB.CFG", GRUB_CFG_LBA, GRUB_CFG_TEXT.len() as u32, 0),
                "grub.cfg",
            ),
        ],
    );

    put(&mut image, README_LBA, README_TEXT);
    put(&mut image, KERNEL_LBA, &kernel_bytes());
    put(&mut image, GRUB_CFG_LBA, GRUB_CFG_TEXT);

    fs::write(path, image)
}

fn put(image: &mut [u8], lba: u32, bytes: &[u8]) {
    let start = lba as usize * ISO_SECTOR_SIZE;
    image[start..start + bytes.len()].copy_from_slice(bytes);
}

fn put_dir(image: &mut [u8], lba: u32, records: &[IsoDirEntry]) {
    let bytes: Vec<u8> = records.iter().flat_map(IsoDirEntry::to_bytes).collect();
    put(image, lba, &bytes);
}

/// Writes `IMAGE.CUE` and `IMAGE.BIN` with two tracks; track 2 starts at 00:02:00.
pub fn write_two_track_cue(dir: &Path) -> io::Result<(PathBuf, PathBuf)> {
    let cue_path = dir.join("IMAGE.CUE");
    let bin_path = dir.join("IMAGE.BIN");
    fs::write(
        &cue_path,
        "TITLE \"Fixture Album\"\nFILE \"IMAGE.BIN\" BINARY\n  TRACK 01 AUDIO\n    INDEX 01 00:00:00\n  TRACK 02 AUDIO\n    INDEX 00 00:01:70\n    INDEX 01 00:02:00\n",
    )?;
    // 2 seconds * 75 frames/sec * 2352 bytes/frame
    let track2_offset = 2 * 75 * 2352;
    let mut bin = vec![0x11u8; track2_offset];
    bin.resize(track2_offset + 200_000, 0x22);
    fs::write(&bin_path, bin)?;
    Ok((cue_path, bin_path))
}

/// Config whose mastering tool is `program`, called without prefix arguments.
pub fn config_with_tool(program: &Path, timeout_secs: u64) -> EditorConfig {
    let mut config = EditorConfig::default();
    config.mastering.program = program.display().to_string();
    config.mastering.prefix_args = Vec::new();
    config.mastering.timeout_secs = timeout_secs;
    config
}

/// Writes an executable POSIX shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    fs::write(path, format!("#!/bin/sh\n{}", body))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(path.to_path_buf())
}

/// A stand-in mastering tool: records its arguments one per line in `args.txt`, copies
/// the staging directory to `staged/`, writes a small output image and warns on stderr.
#[cfg(unix)]
pub fn fake_mastering_tool(dir: &Path) -> io::Result<PathBuf> {
    let args_file = dir.join("args.txt");
    let staged = dir.join("staged");
    write_script(
        &dir.join("fake-mkisofs"),
        &format!(
            r#"printf '%s\n' "$@" > '{args}'
out=""
prev=""
last=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
  last="$a"
done
rm -rf '{staged}'
cp -R "$last" '{staged}'
printf 'FAKE ISO IMAGE' > "$out"
echo "fake-mkisofs: warning: using defaults" >&2
exit 0
"#,
            args = args_file.display(),
            staged = staged.display()
        ),
    )
}

pub fn read_args(dir: &Path) -> io::Result<Vec<String>> {
    Ok(fs::read_to_string(dir.join("args.txt"))?
        .lines()
        .map(str::to_string)
        .collect())
}

// discedit/src/bin/disc-edit.rs
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use discedit::config::EditorConfig;
use discedit::materialize::extract;
use discedit::session::{EditSession, SaveOptions, VolumeDescriptor};
use discedit::tree::{DiscTree, NodeId};
use discedit::worker::{join, spawn_load, spawn_save};
use log::{error, info, warn};
use time::format_description::well_known::Rfc3339;

#[derive(Parser, Debug)]
#[command(name = "disc-edit", version, about = "Edit ISO and CUE/BIN disc images")]
struct Cli {
    /// Editor config file (defaults to the per-user config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the directory tree of an ISO image or CUE sheet
    List { image: PathBuf },
    /// Copy a file or directory out of an image
    Extract {
        image: PathBuf,
        /// Absolute path inside the image
        path: String,
        dest: PathBuf,
    },
    /// Assemble a new image, optionally starting from an existing one
    Build {
        #[arg(long)]
        open: Option<PathBuf>,
        /// Host file to add, optionally `HOST=DIR` to place it in DIR
        #[arg(long = "add", value_name = "HOST[=DIR]")]
        add: Vec<String>,
        /// Host directory to import, optionally `HOSTDIR=DIR`
        #[arg(long = "import", value_name = "HOSTDIR[=DIR]")]
        import: Vec<String>,
        /// Folder to create, parents included
        #[arg(long = "mkdir", value_name = "PATH")]
        mkdir: Vec<String>,
        #[arg(long = "remove", value_name = "PATH")]
        remove: Vec<String>,
        #[arg(long)]
        volume_id: Option<String>,
        #[arg(long)]
        system_id: Option<String>,
        /// BIOS (no emulation) boot image
        #[arg(long)]
        boot: Option<PathBuf>,
        #[arg(long)]
        efi_boot: Option<PathBuf>,
        #[arg(long)]
        udf: bool,
        #[arg(long)]
        hybrid: bool,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> io::Result<()> {
    let config = EditorConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::List { image } => {
            let session = join(spawn_load(image, config))??;
            print_tree(&session);
            Ok(())
        }
        Command::Extract { image, path, dest } => {
            let session = join(spawn_load(image, config))??;
            let node = resolve(session.tree(), &path)?;
            let written = extract(session.tree(), node, &dest)?;
            info!("Extracted {} to {} ({} bytes)", path, dest.display(), written);
            Ok(())
        }
        Command::Build {
            open,
            add,
            import,
            mkdir,
            remove,
            volume_id,
            system_id,
            boot,
            efi_boot,
            udf,
            hybrid,
            output,
        } => {
            let defaults = config.defaults.clone();
            let mut session = match open {
                Some(image) => join(spawn_load(image, config))??,
                None => EditSession::new(config),
            };

            for path in &remove {
                let node = resolve(session.tree(), path)?;
                if !session.remove(node) {
                    warn!("Cannot remove {}", path);
                }
            }
            for path in &mkdir {
                make_dirs(&mut session, path)?;
            }
            for arg in &add {
                let (host, dir) = split_target(arg);
                let target = resolve(session.tree(), dir)?;
                session.add_file(host, target)?;
            }
            for arg in &import {
                let (host, dir) = split_target(arg);
                let target = resolve(session.tree(), dir)?;
                if session.import_directory(host, target)?.is_none() {
                    warn!("{} was not imported: name already in use", host.display());
                }
            }

            if volume_id.is_some() || system_id.is_some() {
                let current = session.volume().clone();
                session.set_volume_descriptor(VolumeDescriptor {
                    volume_id: volume_id.unwrap_or(current.volume_id),
                    system_id: system_id.unwrap_or(current.system_id),
                });
            }
            if boot.is_some() {
                session.set_boot_image(boot);
            }
            if efi_boot.is_some() {
                session.set_efi_boot_image(efi_boot);
            }

            let non_compliant = session.non_compliant_names();
            if !non_compliant.is_empty() {
                warn!(
                    "{} names are not ISO 9660 Level 1; Rock Ridge/Joliet keep them: {}",
                    non_compliant.len(),
                    non_compliant.join(", ")
                );
            }

            let options = SaveOptions {
                use_udf: udf || defaults.use_udf,
                make_hybrid: hybrid || defaults.make_hybrid,
                checksum: defaults.checksum,
            };
            let (_, result) = join(spawn_save(session, output, options))?;
            let report = result?;
            if !report.diagnostics.trim().is_empty() {
                info!("Mastering tool output:\n{}", report.diagnostics.trim_end());
            }
            match report.checksum {
                Some(crc) => println!("{} crc32={:08x}", report.output.display(), crc),
                None => println!("{}", report.output.display()),
            }
            Ok(())
        }
    }
}

fn print_tree(session: &EditSession) {
    let tree = session.tree();
    let root = tree.root();
    println!(
        "Volume '{}' (system '{}'), {} entries, {} bytes",
        session.volume().volume_id,
        session.volume().system_id,
        tree.descendant_count(root),
        tree.total_size(root)
    );
    for (id, depth) in tree.descendants(root) {
        let Some(node) = tree.get(id) else { continue };
        let indent = "  ".repeat(depth - 1);
        let stamp = node.mtime().format(&Rfc3339).unwrap_or_default();
        if node.is_directory() {
            println!("{}{}/  {}", indent, node.name(), stamp);
        } else {
            // `*` marks content that only exists in memory so far.
            let pending = node.origin().is_some_and(|o| o.is_pending());
            println!(
                "{}{}{}  {}  {}",
                indent,
                node.name(),
                if pending { " *" } else { "" },
                node.size(),
                stamp
            );
        }
    }
}

fn resolve(tree: &DiscTree, path: &str) -> io::Result<NodeId> {
    tree.find_path(path).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("'{}' does not exist in the image", path),
        )
    })
}

/// Splits `HOST=DIR`; a bare `HOST` targets the root.
fn split_target(arg: &str) -> (&Path, &str) {
    match arg.split_once('=') {
        Some((host, dir)) => (Path::new(host), dir),
        None => (Path::new(arg), "/"),
    }
}

fn make_dirs(session: &mut EditSession, path: &str) -> io::Result<NodeId> {
    let mut current = session.root();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = match session.tree().find_child(current, segment, true) {
            Some(existing) if session.tree().is_directory(existing) => existing,
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("'{}' in {} is a file", segment, path),
                ));
            }
            None => session.add_folder(segment, current).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Cannot create folder '{}'", segment),
                )
            })?,
        };
    }
    Ok(current)
}

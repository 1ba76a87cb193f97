// discedit/src/synth.rs
//! Drives the external mastering tool over a materialized staging directory.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::MasteringConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long to keep draining output once the tool has exited.
const EXIT_DRAIN: Duration = Duration::from_secs(2);
/// How long to keep draining output after killing a tool that timed out.
const KILL_DRAIN: Duration = Duration::from_millis(500);

/// Everything the mastering tool needs besides the staging directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MasteringRequest {
    pub output: PathBuf,
    pub volume_id: String,
    pub system_id: String,
    /// BIOS boot image, as a file name inside the staging directory.
    pub boot_image: Option<String>,
    /// EFI boot image, as a file name inside the staging directory.
    pub efi_boot_image: Option<String>,
    pub use_udf: bool,
    pub make_hybrid: bool,
}

impl MasteringRequest {
    /// Builds the mkisofs-style argument list, staging directory last.
    pub fn args(&self, staging_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-o".into(),
            self.output.clone().into_os_string(),
            "-R".into(),
            "-J".into(),
            "-V".into(),
            self.volume_id.clone().into(),
            "-sysid".into(),
            self.system_id.clone().into(),
        ];
        if self.use_udf {
            args.push("-udf".into());
        }
        if let Some(bios) = &self.boot_image {
            args.push("-b".into());
            args.push(bios.into());
            args.push("-no-emul-boot".into());
        }
        if let Some(efi) = &self.efi_boot_image {
            args.push("-eltorito-boot".into());
            args.push(efi.into());
            args.push("-no-emul-boot".into());
            if self.make_hybrid {
                args.push("-isohybrid-gpt-basdat".into());
            }
        } else if self.make_hybrid {
            args.push("-isohybrid-mbr".into());
        }
        args.push(staging_dir.as_os_str().to_os_string());
        args
    }
}

/// Captured result of a finished tool run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    fn diagnostics(&self) -> String {
        let mut text = String::new();
        if !self.stderr.trim().is_empty() {
            text.push_str(&format!("\nstderr:\n{}", self.stderr.trim_end()));
        }
        if !self.stdout.trim().is_empty() {
            text.push_str(&format!("\nstdout:\n{}", self.stdout.trim_end()));
        }
        text
    }
}

/// The external image-mastering program and how to call it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MasteringTool {
    program: PathBuf,
    prefix_args: Vec<String>,
    timeout: Duration,
}

impl MasteringTool {
    pub fn new(program: impl Into<PathBuf>, prefix_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            prefix_args,
            timeout,
        }
    }

    /// Takes the configured program as-is; resolution happens at spawn time.
    pub fn from_config(config: &MasteringConfig) -> Self {
        Self::new(&config.program, config.prefix_args.clone(), config.timeout())
    }

    /// Like [`from_config`](Self::from_config) but resolves bare program names on `PATH`
    /// up front, so a missing tool is reported before any staging work.
    pub fn locate(config: &MasteringConfig) -> io::Result<Self> {
        let configured = Path::new(&config.program);
        let program = if configured.components().count() > 1 {
            if !configured.is_file() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Mastering tool {} does not exist", configured.display()),
                ));
            }
            configured.to_path_buf()
        } else {
            which::which(configured).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Mastering tool '{}' not found on PATH: {}", config.program, e),
                )
            })?
        };
        debug!("Using mastering tool {}", program.display());
        Ok(Self::new(program, config.prefix_args.clone(), config.timeout()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn command(&self, request: &MasteringRequest, staging_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.prefix_args);
        cmd.args(request.args(staging_dir));
        cmd
    }

    /// Runs the tool, waiting at most the configured timeout.
    ///
    /// A launch failure or non-zero exit is an `Other` error and a timeout is `TimedOut`;
    /// both carry the captured output.
    pub fn run(&self, request: &MasteringRequest, staging_dir: &Path) -> io::Result<ToolOutput> {
        let mut cmd = self.command(request, staging_dir);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        info!(
            "Running {} for {}",
            self.program.display(),
            request.output.display()
        );

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to launch {}: {}", self.program.display(), e);
            io::Error::other(format!(
                "Failed to launch mastering tool {}: {}",
                self.program.display(),
                e
            ))
        })?;
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        let deadline = Instant::now() + self.timeout;
        let status: Option<ExitStatus> = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Descendants of the tool can hold the pipes open after it is gone.
        let drain = if status.is_some() { EXIT_DRAIN } else { KILL_DRAIN };
        let drain_deadline = Instant::now() + drain;
        let output = ToolOutput {
            exit_code: status.and_then(|s| s.code()),
            stdout: collect(stdout, drain_deadline),
            stderr: collect(stderr, drain_deadline),
        };

        match status {
            None => {
                error!(
                    "{} did not finish within {}s; killed",
                    self.program.display(),
                    self.timeout.as_secs()
                );
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!(
                        "Mastering tool timed out after {}s{}",
                        self.timeout.as_secs(),
                        output.diagnostics()
                    ),
                ))
            }
            Some(status) if !status.success() => {
                let code = status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                error!("{} failed with exit code {}", self.program.display(), code);
                Err(io::Error::other(format!(
                    "Mastering tool failed with exit code {}{}",
                    code,
                    output.diagnostics()
                )))
            }
            Some(_) => {
                info!("Mastering tool finished: {}", request.output.display());
                Ok(output)
            }
        }
    }
}

/// Copies a boot image into the staging root and returns the name to reference it by.
pub fn stage_boot_image(image: &Path, staging_dir: &Path) -> io::Result<String> {
    let name = image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Boot image path {} has no usable file name", image.display()),
            )
        })?
        .to_string();
    let target = staging_dir.join(&name);
    if target.exists() {
        warn!("Boot image {} replaces a staged file of the same name", name);
    }
    fs::copy(image, &target).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Cannot copy boot image {}: {}", image.display(), e),
        )
    })?;
    Ok(name)
}

/// Stages the boot images, then runs the tool.
pub fn synthesize(
    tool: &MasteringTool,
    staging_dir: &Path,
    mut request: MasteringRequest,
    boot_image: Option<&Path>,
    efi_boot_image: Option<&Path>,
) -> io::Result<ToolOutput> {
    if let Some(bios) = boot_image {
        request.boot_image = Some(stage_boot_image(bios, staging_dir)?);
    }
    if let Some(efi) = efi_boot_image {
        request.efi_boot_image = Some(stage_boot_image(efi, staging_dir)?);
    }
    tool.run(&request, staging_dir)
}

fn capture<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut pipe| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            let _ = tx.send(String::from_utf8_lossy(&bytes).into_owned());
        });
        rx
    })
}

/// Waits for a reader thread until `deadline`; a reader still blocked then is abandoned.
fn collect(output: Option<Receiver<String>>, deadline: Instant) -> String {
    output
        .and_then(|rx| {
            rx.recv_timeout(deadline.saturating_duration_since(Instant::now()))
                .ok()
        })
        .unwrap_or_default()
}

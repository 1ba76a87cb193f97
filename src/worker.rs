// discedit/src/worker.rs
//! Background load and save.
//!
//! A save moves the whole [`EditSession`] into the worker thread and hands it back with
//! the result, so nothing else can touch the tree while the mastering tool runs.

use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::config::EditorConfig;
use crate::session::{EditSession, SaveOptions, SaveReport};

pub fn spawn_load(path: PathBuf, config: EditorConfig) -> JoinHandle<io::Result<EditSession>> {
    thread::spawn(move || {
        debug!("Worker loading {}", path.display());
        EditSession::load(&path, config)
    })
}

pub fn spawn_save(
    mut session: EditSession,
    output: PathBuf,
    options: SaveOptions,
) -> JoinHandle<(EditSession, io::Result<SaveReport>)> {
    thread::spawn(move || {
        debug!("Worker saving {}", output.display());
        let result = session.save(&output, &options);
        (session, result)
    })
}

/// Waits for a worker, turning a panic into an error.
pub fn join<T>(handle: JoinHandle<T>) -> io::Result<T> {
    handle
        .join()
        .map_err(|_| io::Error::other("Background worker panicked"))
}

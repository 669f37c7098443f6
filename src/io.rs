//! Memoization of the full dataset on disk.
//!
//! A dataset file is `[8-byte magic number][full_size bytes of nodes]`. The
//! magic number is written last, after the payload, so an interrupted write
//! never looks reusable.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ethereum_types::H256;

use crate::errors::{AquahashError, Result};
use crate::{allocate, REVISION};

pub const DAG_MAGIC_NUM: u64 = 0xFEE1DEADBADDCAFE;
pub const DAG_MAGIC_NUM_SIZE: usize = 8;

/// What [`prepare`] found in the dataset directory.
#[derive(Debug)]
pub enum Prepared {
    /// A file of the right size carrying the magic number. The handle is
    /// positioned right after the magic number.
    Reuse(File),
    /// A freshly created file of the right size, payload and magic number
    /// still to be written.
    Create(File),
    /// A file with the expected name exists but its size or magic number is
    /// wrong. Nothing was modified.
    SizeMismatch,
}

/// `full-R<revision>-<first 8 seed bytes in hex>`
pub fn mutable_name(revision: u32, seed: &H256) -> String {
    format!("full-R{}-{}", revision, hex::encode(&seed.as_bytes()[..8]))
}

pub fn dag_path(dir: &Path, seed: &H256) -> PathBuf {
    dir.join(mutable_name(REVISION, seed))
}

/// Open the dataset file for `seed` in `dir`, or create one sized for
/// `full_size` bytes of payload.
///
/// With `force_create` any existing file is truncated and recreated. The
/// directory is created when absent.
pub fn prepare(dir: &Path, seed: &H256, full_size: usize, force_create: bool) -> Result<Prepared> {
    std::fs::create_dir_all(dir).map_err(AquahashError::io("could not create the dataset directory", dir))?;
    let path = dag_path(dir, seed);

    if !force_create {
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => return check_existing(file, &path, full_size),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                log::error!("could not open dataset file {path:?}: {e}");
                return Err(AquahashError::io("could not open dataset file", path)(e));
            }
        }
    }

    log::debug!("creating dataset file {path:?}");
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(AquahashError::io("could not create dataset file", &path))?;
    extend(&mut file, (full_size + DAG_MAGIC_NUM_SIZE) as u64)
        .map_err(AquahashError::io("could not size dataset file, insufficient space?", &path))?;

    Ok(Prepared::Create(file))
}

fn check_existing(mut file: File, path: &Path, full_size: usize) -> Result<Prepared> {
    let found_size = file
        .metadata()
        .map_err(AquahashError::io("could not query size of dataset file", path))?
        .len();

    let payload = found_size.checked_sub(DAG_MAGIC_NUM_SIZE as u64);
    if payload != Some(full_size as u64) {
        log::warn!("dataset file {path:?} has size {found_size}, expected {}", full_size + DAG_MAGIC_NUM_SIZE);
        return Ok(Prepared::SizeMismatch);
    }

    let magic = match file.read_u64::<LittleEndian>() {
        Ok(magic) => magic,
        Err(e) => {
            log::warn!("could not read magic number of {path:?}: {e}");
            return Ok(Prepared::SizeMismatch);
        }
    };
    if magic != DAG_MAGIC_NUM {
        log::warn!("dataset file {path:?} has magic number {magic:#018x}");
        return Ok(Prepared::SizeMismatch);
    }

    log::debug!("reusing dataset file {path:?}");
    Ok(Prepared::Reuse(file))
}

// Size the file without writing the payload. Falls back to writing the
// last byte where set_len is refused.
fn extend(file: &mut File, len: u64) -> std::io::Result<()> {
    if let Err(e) = file.set_len(len) {
        log::debug!("set_len failed ({e}), extending by writing the last byte");
        file.seek(SeekFrom::Start(len - 1))?;
        file.write_all(b"\n")?;
    }
    file.flush()
}

/// Read the `full_size` byte payload of a file returned as [`Prepared::Reuse`].
pub fn read_dataset(file: &mut File, path: &Path, full_size: usize) -> Result<Vec<u8>> {
    let mut dataset = allocate(full_size)?;
    let read = |file: &mut File, dataset: &mut [u8]| -> std::io::Result<()> {
        file.seek(SeekFrom::Start(DAG_MAGIC_NUM_SIZE as u64))?;
        file.read_exact(dataset)
    };
    read(file, &mut dataset).map_err(AquahashError::io("could not read dataset file", path))?;
    Ok(dataset)
}

/// Write the payload, then the magic number, and sync the file to disk.
pub fn write_dataset(file: &mut File, path: &Path, dataset: &[u8]) -> Result<()> {
    let write = |file: &mut File| -> std::io::Result<()> {
        file.seek(SeekFrom::Start(DAG_MAGIC_NUM_SIZE as u64))?;
        file.write_all(dataset)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_u64::<LittleEndian>(DAG_MAGIC_NUM)?;
        file.flush()?;
        file.sync_all()
    };
    write(file).map_err(AquahashError::io("could not write dataset file", path))
}

/// Remove a dataset file created by this process that never got its
/// magic number.
///
/// The file is checked again first: another process sharing the directory
/// may have recreated and finished it in the meantime, in which case it is
/// left in place.
pub fn discard(path: &Path, full_size: usize) {
    let finished = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(AquahashError::io("could not open dataset file", path))
        .and_then(|file| check_existing(file, path, full_size));
    if let Ok(Prepared::Reuse(_)) = finished {
        log::warn!("dataset file {path:?} was completed by another process, keeping it");
        return;
    }

    if let Err(e) = std::fs::remove_file(path) {
        log::error!("could not remove unfinished dataset file {path:?}: {e}");
    }
}

// Donation Raffle - State Store
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use borsh::{BorshDeserialize, BorshSerialize};
use tracing::debug;

use crate::error::{RaffleError, RaffleResult};

pub const LINKS_KEY: &str = "links";
pub const PRICES_KEY: &str = "prices";
pub const WALLET_KEY: &str = "wallet";
pub const RAFFLE_KEY: &str = "raffle";

/// Durable storage of whole records by name.
///
/// `write` must replace the record atomically: a reader sees either the old
/// bytes or the new bytes, never a mix.
pub trait RecordStore: Send + Sync {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;
    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()>;
}

/// One file per record inside a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

impl RecordStore for FileStore {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.record_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.record_path(key);
        let temp = path.with_extension("bin.tmp");

        // Write the full record aside, then swap it in with a rename
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &path)?;

        debug!(key, bytes = bytes.len(), "record written");
        Ok(())
    }
}

/// Load and decode a record, returning `None` when it was never written
pub fn load_record<T: BorshDeserialize>(
    store: &dyn RecordStore,
    key: &'static str,
) -> RaffleResult<Option<T>> {
    let bytes = store.read(key).map_err(|e| persistence(key, e))?;
    match bytes {
        Some(bytes) => borsh::from_slice::<T>(&bytes)
            .map(Some)
            .map_err(|e| persistence(key, e)),
        None => Ok(None),
    }
}

/// Encode and atomically replace a record
pub fn save_record<T: BorshSerialize>(
    store: &dyn RecordStore,
    key: &'static str,
    value: &T,
) -> RaffleResult<()> {
    let bytes = borsh::to_vec(value).map_err(|e| persistence(key, e))?;
    store.write(key, &bytes).map_err(|e| persistence(key, e))
}

fn persistence(key: &'static str, e: impl std::fmt::Display) -> RaffleError {
    RaffleError::PersistenceFailure {
        key,
        reason: e.to_string(),
    }
}

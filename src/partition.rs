use crate::{
    Error,
    naming::partition_path,
    system::DiskWriter,
};
use std::{
    path::{Path, PathBuf},
    thread,
    time::Duration,
};
use strum::Display;
use tracing::{info, warn};

/// Devices strictly larger than this get a GPT; MBR cannot address past 2 TiB.
pub const GPT_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024 * 1024;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TableKind {
    Mbr,
    Gpt,
}

impl TableKind {
    pub fn for_size(bytes: u64) -> Self {
        if bytes > GPT_THRESHOLD { Self::Gpt } else { Self::Mbr }
    }

    /// Name libparted uses for this table type.
    pub fn disk_type(self) -> &'static str {
        match self {
            Self::Mbr => "msdos",
            Self::Gpt => "gpt",
        }
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum FileSystem {
    Fat32,
}

impl From<FileSystem> for libparted::FileSystemType<'_> {
    #[allow(clippy::unwrap_used, reason = "libparted always ships fat32")]
    fn from(value: FileSystem) -> Self {
        Self::get(&value.to_string()).unwrap()
    }
}

/// The layout that will be written to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    parent: PathBuf,
    table: TableKind,
    partition: PathBuf,
}

impl PartitionSpec {
    pub fn new(parent: impl Into<PathBuf>, size: u64) -> Self {
        let parent = parent.into();
        Self {
            partition: partition_path(&parent, 1),
            table: TableKind::for_size(size),
            parent,
        }
    }

    pub fn parent(&self) -> &Path {
        &self.parent
    }

    pub fn table(&self) -> TableKind {
        self.table
    }

    /// The node the kernel is expected to create for the new partition.
    pub fn partition(&self) -> &Path {
        &self.partition
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
    /// Re-read the partition table after every this many failed checks.
    pub reread_every: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 15,
            interval: Duration::from_millis(300),
            reread_every: 5,
        }
    }
}

/// Checks `exists(path)` up to `attempts` times, sleeping `interval` in between.
/// `on_retry` gets the number of the attempt that just failed, except after the last one.
pub fn wait_for_path(
    path: &Path,
    attempts: u32,
    interval: Duration,
    exists: impl Fn(&Path) -> bool,
    mut on_retry: impl FnMut(u32),
) -> bool {
    for attempt in 1..=attempts {
        if exists(path) {
            return true;
        }
        if attempt < attempts {
            on_retry(attempt);
            thread::sleep(interval);
        }
    }
    false
}

/// Writes a fresh table with one full-size partition, then waits for its node.
///
/// Returns whether the partition node was seen. Table or partition creation failures
/// abort; a node that never shows up does not.
pub fn create_partition<H: DiskWriter>(
    host: &H,
    spec: &PartitionSpec,
    poll: &PollConfig,
) -> Result<bool, Error> {
    let device = spec.parent();
    info!(device = %device.display(), table = %spec.table(), "creating partition table");
    host.create_table(device, spec.table())
        .map_err(|source| Error::PartitionTableError {
            device: device.to_path_buf(),
            action: "create partition table",
            source,
        })?;

    info!(device = %device.display(), "creating partition");
    host.create_partition(device, FileSystem::Fat32)
        .map_err(|source| Error::PartitionTableError {
            device: device.to_path_buf(),
            action: "create partition",
            source,
        })?;

    reread(host, device);
    let found = wait_for_path(
        spec.partition(),
        poll.attempts,
        poll.interval,
        |path| host.exists(path),
        |attempt| {
            if poll.reread_every > 0 && attempt % poll.reread_every == 0 {
                reread(host, device);
            }
        },
    );
    if found {
        info!(partition = %spec.partition().display(), "partition node ready");
    }
    Ok(found)
}

fn reread<H: DiskWriter>(host: &H, device: &Path) {
    if let Err(e) = host.reread(device) {
        warn!(device = %device.display(), error = %e, "could not re-read partition table");
    }
}

#![deny(clippy::unwrap_used)]

mod device;
mod format;
mod mounts;
pub mod naming;
mod partition;
mod pipeline;
pub mod system;
#[cfg(test)]
mod testing;

pub use device::*;
pub use format::*;
pub use mounts::*;
pub use partition::*;
pub use pipeline::*;

use std::{fmt, io, path::PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not a block device")]
    DeviceNotFound(PathBuf),
    #[error("refusing to touch {0}: it holds the root filesystem")]
    RootDeviceProtected(PathBuf),
    #[error("failed to unmount {mount_point}")]
    UnmountFailed {
        mount_point: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to {action} on {device}")]
    PartitionTableError {
        device: PathBuf,
        action: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("partition node {0} never appeared")]
    PartitionNodeNotConfirmed(PathBuf),
    #[error("no FAT32 formatter found (mkfs.vfat or mkfs.fat, usually from dosfstools)")]
    FormatUtilityMissing,
    #[error("formatting {partition} failed ({status}): {stderr}")]
    FormatFailed {
        partition: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("selection {index} is out of range (1-{count})")]
    InvalidSelection { index: usize, count: usize },
    #[error("failed to {0}")]
    Io(&'static str, #[source] io::Error),
}

/// Non-fatal conditions raised while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The target does not report itself as removable media.
    NotRemovable(PathBuf),
    /// The partition node could not be seen after polling; the derived name was used anyway.
    PartitionNodeNotConfirmed(PathBuf),
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRemovable(path) => {
                write!(f, "{} is not marked as removable", path.display())
            }
            Self::PartitionNodeNotConfirmed(path) => write!(
                f,
                "{} did not appear after re-reading the partition table; formatting it anyway",
                path.display()
            ),
        }
    }
}

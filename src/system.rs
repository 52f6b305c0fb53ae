//! Host capabilities the pipeline stages are generic over, and [`System`], the
//! implementation backed by the running Linux host.

use crate::{FileSystem, FormatRequest, TableKind, naming};
use nix::sys::stat;
use std::{
    env, fs, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, warn};

/// One entry of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub fstype: String,
}

/// Exit status and diagnostics of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub code: Option<i32>,
    pub stderr: String,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Read-only queries about block devices.
pub trait DeviceProbe {
    /// Device nodes in the scanned namespaces, partitions included.
    fn candidates(&self) -> io::Result<Vec<PathBuf>>;
    fn is_block_device(&self, path: &Path) -> bool;
    /// `None` when the device has no readable removable attribute.
    fn removable(&self, device: &Path) -> Option<bool>;
    fn size(&self, device: &Path) -> Option<u64>;
    fn model(&self, device: &Path) -> Option<String>;
    /// Filesystem label of a device node.
    fn label(&self, device: &Path) -> Option<String>;
    /// Follows symlinks such as `/dev/disk/by-id/*` to the real node.
    fn resolve(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
    /// Whole disk backing the filesystem mounted at `/`, found from its device number.
    ///
    /// `None` when `/` is not on a block device with a sysfs entry (btrfs subvolumes,
    /// overlays), in which case the mount table is consulted instead.
    fn root_disk(&self) -> Option<PathBuf> {
        None
    }
}

pub trait MountTable {
    fn mounts(&self) -> io::Result<Vec<Mount>>;
    fn unmount(&self, target: &Path) -> io::Result<()>;
}

/// Everything that writes to a device or waits on the kernel.
pub trait DiskWriter {
    fn create_table(&self, device: &Path, table: TableKind) -> io::Result<()>;
    /// Adds one partition covering the whole device.
    fn create_partition(&self, device: &Path, fs: FileSystem) -> io::Result<()>;
    /// Asks the kernel to re-read the partition table of `device`.
    fn reread(&self, device: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
    /// Location of a FAT32 formatter, if one is installed.
    fn formatter(&self) -> Option<PathBuf>;
    fn format(&self, tool: &Path, request: &FormatRequest) -> io::Result<Outcome>;
}

pub trait Host: DeviceProbe + MountTable + DiskWriter {}

impl<T: DeviceProbe + MountTable + DiskWriter> Host for T {}

const FORMATTERS: &[&str] = &["mkfs.vfat", "mkfs.fat"];
/// Searched after `PATH`, which often lacks the sbin directories for regular users.
const SBIN_DIRS: &[&str] = &["/usr/local/sbin", "/usr/sbin", "/sbin"];
/// Start of the first partition. Matches what parted picks for `0%`.
const ALIGNMENT: u64 = 1024 * 1024;

/// The running host: sysfs, `/proc/self/mounts`, libparted and the usual command-line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl System {
    fn sysfs(device: &Path) -> Option<PathBuf> {
        let name = device.file_name()?;
        Some(Path::new("/sys/class/block").join(name))
    }
}

impl DeviceProbe for System {
    fn candidates(&self) -> io::Result<Vec<PathBuf>> {
        let mut nodes = fs::read_dir("/dev")?
            .flatten()
            .filter(|e| e.file_name().to_str().is_some_and(naming::is_disk_name))
            .map(|e| e.path())
            .collect::<Vec<_>>();
        nodes.sort();
        Ok(nodes)
    }

    fn is_block_device(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|m| m.file_type().is_block_device())
    }

    fn removable(&self, device: &Path) -> Option<bool> {
        read_u64(Self::sysfs(device)?.join("removable")).map(|v| v == 1)
    }

    fn size(&self, device: &Path) -> Option<u64> {
        // sysfs always counts 512-byte sectors, whatever the logical sector size
        read_u64(Self::sysfs(device)?.join("size")).map(|sectors| sectors.saturating_mul(512))
    }

    fn model(&self, device: &Path) -> Option<String> {
        read_string(Self::sysfs(device)?.join("device/model")).filter(|m| !m.is_empty())
    }

    fn label(&self, device: &Path) -> Option<String> {
        let device = self.resolve(device);
        fs::read_dir("/dev/disk/by-label")
            .ok()?
            .flatten()
            .find(|e| fs::canonicalize(e.path()).is_ok_and(|target| target == device))
            .map(|e| e.file_name().to_string_lossy().replace("\\x20", " "))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    // `/dev/root` in the mount table often has no node behind it, the device number does
    fn root_disk(&self) -> Option<PathBuf> {
        let dev = stat::stat("/").ok()?.st_dev;
        let entry = fs::canonicalize(format!(
            "/sys/dev/block/{}:{}",
            stat::major(dev),
            stat::minor(dev)
        ))
        .ok()?;
        let disk = if entry.join("partition").exists() {
            entry.parent()?
        } else {
            entry.as_path()
        };
        debug!(sysfs = %entry.display(), "found device behind /");
        Some(Path::new("/dev").join(disk.file_name()?))
    }
}

impl MountTable for System {
    fn mounts(&self) -> io::Result<Vec<Mount>> {
        Ok(proc_mounts::MountIter::new()?
            .flatten()
            .map(|m| Mount {
                source: m.source,
                dest: m.dest,
                fstype: m.fstype,
            })
            .collect())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        nix::mount::umount(target).map_err(io::Error::from)
    }
}

impl DiskWriter for System {
    fn create_table(&self, device: &Path, table: TableKind) -> io::Result<()> {
        let mut raw = libparted::Device::new(device)?;
        let disk_type = libparted::DiskType::get(table.disk_type()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                format!("libparted does not know the {} disk type", table.disk_type()),
            )
        })?;
        let mut disk = libparted::Disk::new_fresh(&mut raw, disk_type)?;
        disk.commit()
    }

    fn create_partition(&self, device: &Path, fs: FileSystem) -> io::Result<()> {
        let mut raw = libparted::Device::new(device)?;
        let start = (ALIGNMENT / raw.sector_size().max(1)) as i64;
        let end = raw.length() as i64 - 1;
        let mut disk = libparted::Disk::new(&mut raw)?;
        add_partition(&mut disk, fs, start, end)?;
        disk.commit()
    }

    fn reread(&self, device: &Path) -> io::Result<()> {
        match run(Command::new("partprobe").arg(device)) {
            Ok(outcome) if outcome.success() => return Ok(()),
            Ok(outcome) => debug!(stderr = %outcome.stderr, "partprobe failed"),
            Err(e) => debug!(error = %e, "partprobe unavailable"),
        }
        let outcome = run(Command::new("blockdev").arg("--rereadpt").arg(device))?;
        if outcome.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "blockdev --rereadpt failed: {}",
                outcome.stderr
            )))
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn formatter(&self) -> Option<PathBuf> {
        let dirs = env::var_os("PATH")
            .map(|p| env::split_paths(&p).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
            .chain(SBIN_DIRS.iter().map(PathBuf::from))
            .collect::<Vec<_>>();
        FORMATTERS.iter().find_map(|tool| {
            dirs.iter()
                .map(|dir| dir.join(tool))
                .find(|candidate| candidate.is_file())
        })
    }

    fn format(&self, tool: &Path, request: &FormatRequest) -> io::Result<Outcome> {
        let outcome = run(Command::new(tool)
            .arg("-F")
            .arg("32")
            .arg("-n")
            .arg(request.label().as_str())
            .arg(request.partition()))?;
        if !outcome.success() {
            warn!(tool = %tool.display(), code = ?outcome.code, "formatter exited with an error");
        }
        Ok(outcome)
    }
}

fn add_partition(
    disk: &mut libparted::Disk,
    fs: FileSystem,
    start: i64,
    end: i64,
) -> io::Result<()> {
    let fs_type = libparted::FileSystemType::from(fs);
    let mut part = libparted::Partition::new(
        disk,
        libparted::PartitionType::PED_PARTITION_NORMAL,
        Some(&fs_type),
        start,
        end,
    )?;

    disk.add_partition(
        &mut part,
        // SAFETY: this device reference is only used once
        &unsafe { disk.get_device().get_optimal_aligned_constraint()? },
    )
}

fn run(command: &mut Command) -> io::Result<Outcome> {
    debug!(?command, "running");
    let output = command.output()?;
    Ok(Outcome {
        code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

fn read_string(path: impl AsRef<Path>) -> Option<String> {
    fs::read_to_string(path).ok().map(|value| value.trim().to_string())
}

fn read_u64(path: impl AsRef<Path>) -> Option<u64> {
    read_string(path).and_then(|value| value.parse::<u64>().ok())
}

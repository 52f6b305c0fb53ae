use crate::{
    Error,
    naming::base_device,
    system::{DeviceProbe, Mount, MountTable},
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Current mounts of `device` or any of its partitions.
pub fn mounts_of<H: DeviceProbe + MountTable>(host: &H, device: &Path) -> Result<Vec<Mount>, Error> {
    Ok(host
        .mounts()
        .map_err(|e| Error::Io("read the mount table", e))?
        .into_iter()
        .filter(|m| base_device(&host.resolve(&m.source)) == device)
        .collect())
}

/// Unmounts everything on `device`, deepest mount point first.
///
/// A mount point with several mounts stacked on it is unmounted once per mount.
/// Stops at the first failure; the device is never left for partitioning while part of it
/// is still mounted. Returns the mount points that were released.
pub fn release_mounts<H: DeviceProbe + MountTable>(
    host: &H,
    device: &Path,
) -> Result<Vec<PathBuf>, Error> {
    let mut targets = mounts_of(host, device)?
        .into_iter()
        .map(|m| m.dest)
        .collect::<Vec<_>>();
    targets.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });

    for target in &targets {
        info!(mount_point = %target.display(), "unmounting");
        host.unmount(target)
            .map_err(|source| Error::UnmountFailed {
                mount_point: target.clone(),
                source,
            })?;
    }
    Ok(targets)
}

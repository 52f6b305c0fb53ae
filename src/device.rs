use crate::{
    Error, Warning,
    naming::base_device,
    system::{DeviceProbe, Mount, MountTable},
};
use byte_unit::Byte;
use itertools::Itertools;
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// A whole disk as seen during a scan.
#[derive(Clone, PartialEq, Eq)]
pub struct BlockDevice {
    path: Arc<Path>,
    size: u64,
    removable: bool,
    label: Option<Arc<str>>,
    fs_type: Option<Arc<str>>,
    mount_point: Option<Arc<Path>>,
    model: Option<Arc<str>>,
}

impl Debug for BlockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockDevice")
            .field("path", &self.path)
            .field("size", &self.size())
            .field("removable", &self.removable)
            .field("label", &self.label)
            .field("fs_type", &self.fs_type)
            .field("mount_point", &self.mount_point)
            .field("model", &self.model)
            .finish()
    }
}

impl BlockDevice {
    fn describe<H: DeviceProbe>(
        host: &H,
        path: &Path,
        candidates: &[PathBuf],
        mounts: &[Mount],
    ) -> Self {
        let members = std::iter::once(path.to_path_buf())
            .chain(
                candidates
                    .iter()
                    .filter(|c| c.as_path() != path && base_device(c) == path)
                    .cloned(),
            )
            .collect::<Vec<_>>();
        let mount = mounts
            .iter()
            .find(|m| base_device(&host.resolve(&m.source)) == path);

        Self {
            path: path.into(),
            size: host.size(path).unwrap_or_default(),
            removable: host.removable(path).unwrap_or(false),
            label: members.iter().find_map(|m| host.label(m)).map(Into::into),
            fs_type: mount.map(|m| m.fstype.as_str().into()),
            mount_point: mount.map(|m| m.dest.as_path().into()),
            model: host.model(path).map(Into::into),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    pub fn size(&self) -> Byte {
        Byte::from_u64(self.size)
    }

    pub fn bytes(&self) -> u64 {
        self.size
    }

    pub fn removable(&self) -> bool {
        self.removable
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn fs_type(&self) -> Option<&str> {
        self.fs_type.as_deref()
    }

    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    pub fn mounted(&self) -> bool {
        self.mount_point.is_some()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// The disk holding the root filesystem.
///
/// Asks the host for the disk behind `/` first. Falls back to the source of the `/`
/// mount, which may be an alias such as `/dev/root`.
pub fn root_device<H: DeviceProbe + MountTable>(host: &H) -> Result<Option<PathBuf>, Error> {
    if let Some(disk) = host.root_disk() {
        let root = base_device(&disk);
        debug!(root = %root.display(), "resolved root device from its device number");
        return Ok(Some(root));
    }
    let mounts = host
        .mounts()
        .map_err(|e| Error::Io("read the mount table", e))?;
    let root = mounts
        .iter()
        .rev()
        .find(|m| m.dest == Path::new("/"))
        .map(|m| base_device(&host.resolve(&m.source)));
    debug!(root = ?root, "resolved root device");
    Ok(root)
}

/// Lists the removable disks other than `root`, each disk once, in name order.
pub fn scan<H: DeviceProbe + MountTable>(
    host: &H,
    root: Option<&Path>,
) -> Result<Vec<BlockDevice>, Error> {
    let candidates = host
        .candidates()
        .map_err(|e| Error::Io("list block devices", e))?;
    let mounts = host
        .mounts()
        .map_err(|e| Error::Io("read the mount table", e))?;

    let devices = candidates
        .iter()
        .map(|c| base_device(c))
        .unique()
        .filter(|base| {
            if Some(base.as_path()) == root {
                debug!(device = %base.display(), "skipping root device");
                return false;
            }
            match host.removable(base) {
                Some(true) => true,
                Some(false) => {
                    debug!(device = %base.display(), "skipping fixed device");
                    false
                }
                None => {
                    debug!(device = %base.display(), "no removable attribute");
                    false
                }
            }
        })
        .map(|base| BlockDevice::describe(host, &base, &candidates, &mounts))
        .collect::<Vec<_>>();

    info!(count = devices.len(), "scan finished");
    Ok(devices)
}

/// A device that passed validation.
#[derive(Debug, Clone)]
pub struct Validated {
    pub device: BlockDevice,
    pub warnings: Vec<Warning>,
}

/// Checks `path` before anything destructive happens to it.
///
/// Partitions are widened to their whole disk. The disk must exist and must not be
/// `root`. A disk that is not marked removable passes with a warning.
pub fn validate<H: DeviceProbe + MountTable>(
    host: &H,
    path: &Path,
    root: Option<&Path>,
) -> Result<Validated, Error> {
    if !host.is_block_device(path) {
        return Err(Error::DeviceNotFound(path.to_path_buf()));
    }
    let base = base_device(&host.resolve(path));
    if base != path {
        info!(given = %path.display(), device = %base.display(), "using the whole device");
        if !host.is_block_device(&base) {
            return Err(Error::DeviceNotFound(base));
        }
    }
    if Some(base.as_path()) == root {
        return Err(Error::RootDeviceProtected(base));
    }

    let mut warnings = Vec::new();
    if host.removable(&base) != Some(true) {
        let warning = Warning::NotRemovable(base.clone());
        warn!("{warning}");
        warnings.push(warning);
    }

    let candidates = host
        .candidates()
        .map_err(|e| Error::Io("list block devices", e))?;
    let mounts = host
        .mounts()
        .map_err(|e| Error::Io("read the mount table", e))?;

    Ok(Validated {
        device: BlockDevice::describe(host, &base, &candidates, &mounts),
        warnings,
    })
}

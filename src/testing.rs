//! In-memory host for exercising the stages without real devices.

use crate::{
    FileSystem, FormatRequest, TableKind,
    naming::{base_device, is_disk_name, partition_path},
    system::{DeviceProbe, DiskWriter, Mount, MountTable, Outcome},
};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet},
    io,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Unmount(PathBuf),
    CreateTable(PathBuf, TableKind),
    CreatePartition(PathBuf),
    Reread(PathBuf),
    Format {
        tool: PathBuf,
        partition: PathBuf,
        label: String,
    },
}

struct Disk {
    size: u64,
    removable: Option<bool>,
}

/// When a freshly created partition node becomes visible.
#[derive(Clone, Copy)]
enum NodePolicy {
    Immediately,
    AfterChecks(u32),
    Never,
}

pub(crate) struct FakeHost {
    disks: BTreeMap<PathBuf, Disk>,
    nodes: RefCell<BTreeSet<PathBuf>>,
    labels: BTreeMap<PathBuf, String>,
    mounts: RefCell<Vec<Mount>>,
    busy: BTreeSet<PathBuf>,
    root_disk: Option<PathBuf>,
    fail_table: bool,
    fail_partition: bool,
    node_policy: NodePolicy,
    pending: RefCell<Option<PathBuf>>,
    checks: Cell<u32>,
    formatter: Option<PathBuf>,
    format_exit: i32,
    calls: RefCell<Vec<Call>>,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        Self {
            disks: BTreeMap::new(),
            nodes: RefCell::default(),
            labels: BTreeMap::new(),
            mounts: RefCell::default(),
            busy: BTreeSet::new(),
            root_disk: None,
            fail_table: false,
            fail_partition: false,
            node_policy: NodePolicy::Immediately,
            pending: RefCell::default(),
            checks: Cell::new(0),
            formatter: Some(PathBuf::from("/usr/sbin/mkfs.vfat")),
            format_exit: 0,
            calls: RefCell::default(),
        }
    }

    pub(crate) fn disk(mut self, path: &str, size: u64, removable: Option<bool>) -> Self {
        self.disks.insert(path.into(), Disk { size, removable });
        self.node(path)
    }

    pub(crate) fn node(self, path: &str) -> Self {
        self.nodes.borrow_mut().insert(path.into());
        self
    }

    pub(crate) fn label(mut self, path: &str, label: &str) -> Self {
        self.labels.insert(path.into(), label.into());
        self
    }

    pub(crate) fn mount(self, source: &str, dest: &str, fstype: &str) -> Self {
        self.mounts.borrow_mut().push(Mount {
            source: source.into(),
            dest: dest.into(),
            fstype: fstype.into(),
        });
        self
    }

    /// Unmounting `dest` fails with `EBUSY`.
    pub(crate) fn busy(mut self, dest: &str) -> Self {
        self.busy.insert(dest.into());
        self
    }

    /// The disk the host reports behind `/`, whatever the mount table says.
    pub(crate) fn root_disk(mut self, path: &str) -> Self {
        self.root_disk = Some(path.into());
        self
    }

    pub(crate) fn fail_table(mut self) -> Self {
        self.fail_table = true;
        self
    }

    pub(crate) fn fail_partition(mut self) -> Self {
        self.fail_partition = true;
        self
    }

    pub(crate) fn node_appears_after(mut self, checks: u32) -> Self {
        self.node_policy = NodePolicy::AfterChecks(checks);
        self
    }

    pub(crate) fn node_never_appears(mut self) -> Self {
        self.node_policy = NodePolicy::Never;
        self
    }

    pub(crate) fn without_formatter(mut self) -> Self {
        self.formatter = None;
        self
    }

    pub(crate) fn format_exit(mut self, code: i32) -> Self {
        self.format_exit = code;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl DeviceProbe for FakeHost {
    fn candidates(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self
            .nodes
            .borrow()
            .iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_disk_name)
            })
            .cloned()
            .collect())
    }

    fn is_block_device(&self, path: &Path) -> bool {
        self.nodes.borrow().contains(path)
    }

    fn removable(&self, device: &Path) -> Option<bool> {
        self.disks.get(device).and_then(|d| d.removable)
    }

    fn size(&self, device: &Path) -> Option<u64> {
        self.disks.get(device).map(|d| d.size)
    }

    fn model(&self, device: &Path) -> Option<String> {
        self.disks.get(device).map(|_| "Fake Flash Disk".to_string())
    }

    fn label(&self, device: &Path) -> Option<String> {
        self.labels.get(device).cloned()
    }

    fn root_disk(&self) -> Option<PathBuf> {
        self.root_disk.clone()
    }
}

impl MountTable for FakeHost {
    fn mounts(&self) -> io::Result<Vec<Mount>> {
        Ok(self.mounts.borrow().clone())
    }

    fn unmount(&self, target: &Path) -> io::Result<()> {
        if self.busy.contains(target) {
            return Err(io::Error::from_raw_os_error(16));
        }
        let mut mounts = self.mounts.borrow_mut();
        // EINVAL, like umount(2) on a path that is not a mount point
        let top = mounts
            .iter()
            .rposition(|m| m.dest == target)
            .ok_or_else(|| io::Error::from_raw_os_error(22))?;
        mounts.remove(top);
        self.record(Call::Unmount(target.into()));
        Ok(())
    }
}

impl DiskWriter for FakeHost {
    fn create_table(&self, device: &Path, table: TableKind) -> io::Result<()> {
        if self.fail_table {
            return Err(io::Error::other("libparted refused"));
        }
        self.record(Call::CreateTable(device.into(), table));
        // the old partitions are gone along with the old table
        self.nodes
            .borrow_mut()
            .retain(|n| n == device || base_device(n) != device);
        Ok(())
    }

    fn create_partition(&self, device: &Path, fs: FileSystem) -> io::Result<()> {
        assert_eq!(fs, FileSystem::Fat32);
        if self.fail_partition {
            return Err(io::Error::other("no free space for the partition"));
        }
        self.record(Call::CreatePartition(device.into()));
        let node = partition_path(device, 1);
        match self.node_policy {
            NodePolicy::Immediately => {
                self.nodes.borrow_mut().insert(node);
            }
            NodePolicy::AfterChecks(_) => {
                self.checks.set(0);
                *self.pending.borrow_mut() = Some(node);
            }
            NodePolicy::Never => {}
        }
        Ok(())
    }

    fn reread(&self, device: &Path) -> io::Result<()> {
        self.record(Call::Reread(device.into()));
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        if self.nodes.borrow().contains(path) {
            return true;
        }
        let NodePolicy::AfterChecks(after) = self.node_policy else {
            return false;
        };
        if self.pending.borrow().as_deref() != Some(path) {
            return false;
        }
        self.checks.set(self.checks.get() + 1);
        if self.checks.get() < after {
            return false;
        }
        self.pending.borrow_mut().take();
        self.nodes.borrow_mut().insert(path.into());
        true
    }

    fn formatter(&self) -> Option<PathBuf> {
        self.formatter.clone()
    }

    fn format(&self, tool: &Path, request: &FormatRequest) -> io::Result<Outcome> {
        self.record(Call::Format {
            tool: tool.into(),
            partition: request.partition().into(),
            label: request.label().as_str().into(),
        });
        Ok(Outcome {
            code: Some(self.format_exit),
            stderr: if self.format_exit == 0 {
                String::new()
            } else {
                "mkfs.fat: unable to open".to_string()
            },
        })
    }
}

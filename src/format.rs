use crate::{Error, FileSystem, system::DiskWriter};
use std::{
    fmt, io,
    path::{Path, PathBuf},
};
use tracing::info;

/// FAT volume labels are at most 11 bytes.
pub const MAX_LABEL_LEN: usize = 11;
pub const DEFAULT_LABEL: &str = "USB_DRIVE";

/// A FAT volume label: upper-case ASCII, truncated to [`MAX_LABEL_LEN`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLabel(String);

impl VolumeLabel {
    /// Normalizes `input`. Blank input falls back to [`DEFAULT_LABEL`].
    ///
    /// Characters outside printable ASCII become `_`, so one character is one byte on disk
    /// and the formatter never sees a label it would reject.
    pub fn new(input: &str) -> Self {
        let input = if input.trim().is_empty() {
            DEFAULT_LABEL
        } else {
            input
        };
        Self(
            input
                .chars()
                .map(|c| {
                    if c == ' ' || c.is_ascii_graphic() {
                        c.to_ascii_uppercase()
                    } else {
                        '_'
                    }
                })
                .take(MAX_LABEL_LEN)
                .collect(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VolumeLabel {
    fn default() -> Self {
        Self(DEFAULT_LABEL.to_string())
    }
}

impl fmt::Display for VolumeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRequest {
    partition: PathBuf,
    label: VolumeLabel,
    fs: FileSystem,
}

impl FormatRequest {
    pub fn new(partition: impl Into<PathBuf>, label: VolumeLabel) -> Self {
        Self {
            partition: partition.into(),
            label,
            fs: FileSystem::Fat32,
        }
    }

    pub fn partition(&self) -> &Path {
        &self.partition
    }

    pub fn label(&self) -> &VolumeLabel {
        &self.label
    }

    pub fn fs(&self) -> FileSystem {
        self.fs
    }
}

/// Finds the FAT32 formatter, failing with [`Error::FormatUtilityMissing`].
pub fn find_formatter<H: DiskWriter>(host: &H) -> Result<PathBuf, Error> {
    host.formatter().ok_or(Error::FormatUtilityMissing)
}

/// Formats the partition in `request` with `tool`. Nothing is undone on failure.
pub fn format<H: DiskWriter>(host: &H, tool: &Path, request: &FormatRequest) -> Result<(), Error> {
    info!(
        partition = %request.partition().display(),
        label = %request.label(),
        fs = %request.fs(),
        "formatting"
    );
    let outcome = host.format(tool, request).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::FormatUtilityMissing,
        _ => Error::Io("run the formatter", e),
    })?;
    if !outcome.success() {
        return Err(Error::FormatFailed {
            partition: request.partition().to_path_buf(),
            status: outcome
                .code
                .map(|c| format!("exit code {c}"))
                .unwrap_or_else(|| "killed by signal".to_string()),
            stderr: outcome.stderr,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeHost};

    #[test]
    fn label_is_upper_cased_and_truncated() {
        assert_eq!(VolumeLabel::new("my new drive").as_str(), "MY NEW DRIV");
        assert_eq!(VolumeLabel::new("backup").as_str(), "BACKUP");
        assert_eq!(VolumeLabel::new("abcdefghijklmnop").as_str().chars().count(), 11);
    }

    #[test]
    fn label_never_exceeds_eleven_bytes() {
        let label = VolumeLabel::new("données été 2024");
        assert_eq!(label.as_str(), "DONN_ES _T_");
        assert_eq!(label.as_str().len(), MAX_LABEL_LEN);
        assert_eq!(VolumeLabel::new("straße").as_str(), "STRA_E");
    }

    #[test]
    fn blank_label_uses_default() {
        assert_eq!(VolumeLabel::new("").as_str(), DEFAULT_LABEL);
        assert_eq!(VolumeLabel::new("   "), VolumeLabel::default());
    }

    #[test]
    fn formats_the_partition_not_the_disk() {
        let host = FakeHost::new();
        let request = FormatRequest::new("/dev/sdb1", VolumeLabel::new("stick"));

        format(&host, Path::new("/sbin/mkfs.vfat"), &request).unwrap();

        assert_eq!(
            host.calls(),
            [Call::Format {
                tool: "/sbin/mkfs.vfat".into(),
                partition: "/dev/sdb1".into(),
                label: "STICK".into(),
            }]
        );
    }

    #[test]
    fn non_zero_exit_is_a_failure() {
        let host = FakeHost::new().format_exit(1);
        let request = FormatRequest::new("/dev/sdb1", VolumeLabel::default());

        let err = format(&host, Path::new("/sbin/mkfs.vfat"), &request).unwrap_err();

        match err {
            Error::FormatFailed { partition, status, .. } => {
                assert_eq!(partition, Path::new("/dev/sdb1"));
                assert_eq!(status, "exit code 1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_formatter_is_reported() {
        let host = FakeHost::new().without_formatter();
        assert!(matches!(find_formatter(&host), Err(Error::FormatUtilityMissing)));
    }
}

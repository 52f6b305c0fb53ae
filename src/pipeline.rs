//! The enumerate → validate → unmount → partition → format run.

use crate::{
    BlockDevice, Error, FormatRequest, PartitionSpec, PollConfig, TableKind, Validated,
    VolumeLabel, Warning, create_partition, find_formatter, format, release_mounts,
    root_device, scan, system::Host, validate,
};
use std::path::{Path, PathBuf};
use strum::Display;
use tracing::{error, info, warn};

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scanning,
    Selected,
    Validated,
    Unmounted,
    Partitioned,
    Formatted,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Fail instead of warning when the partition node cannot be confirmed.
    pub strict: bool,
    pub poll: PollConfig,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Report {
    pub device: PathBuf,
    pub table: TableKind,
    pub partition: PathBuf,
    /// Whether the partition node was seen before formatting.
    pub confirmed: bool,
    pub label: VolumeLabel,
    pub unmounted: Vec<PathBuf>,
    pub warnings: Vec<Warning>,
}

pub struct Pipeline<'h, H> {
    host: &'h H,
    options: Options,
    root: Option<PathBuf>,
    stage: Stage,
}

impl<'h, H: Host> Pipeline<'h, H> {
    /// Resolves the root device once; every later check compares against it.
    pub fn new(host: &'h H, options: Options) -> Result<Self, Error> {
        Ok(Self {
            root: root_device(host)?,
            host,
            options,
            stage: Stage::Scanning,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn root_device(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn scan(&self) -> Result<Vec<BlockDevice>, Error> {
        scan(self.host, self.root_device())
    }

    /// Validation on its own, for checking a target before prompting about it.
    pub fn validate(&self, device: &Path) -> Result<Validated, Error> {
        validate(self.host, device, self.root_device())
    }

    /// Runs every stage against `device`. The first failure leaves the pipeline in
    /// [`Stage::Failed`] and nothing after it runs.
    pub fn run(&mut self, device: &Path, label: VolumeLabel) -> Result<Report, Error> {
        self.advance(Stage::Selected);
        let result = self.execute(device, label);
        if let Err(e) = &result {
            error!(device = %device.display(), error = %e, "aborted after stage {}", self.stage);
            self.stage = Stage::Failed;
        }
        result
    }

    fn execute(&mut self, device: &Path, label: VolumeLabel) -> Result<Report, Error> {
        let Validated {
            device,
            mut warnings,
        } = self.validate(device)?;
        self.advance(Stage::Validated);

        // before anything destructive, so a missing tool cannot leave a blank disk
        let tool = find_formatter(self.host)?;

        let unmounted = release_mounts(self.host, device.path())?;
        self.advance(Stage::Unmounted);

        let spec = PartitionSpec::new(device.path(), device.bytes());
        let confirmed = create_partition(self.host, &spec, &self.options.poll)?;
        if !confirmed {
            if self.options.strict {
                return Err(Error::PartitionNodeNotConfirmed(spec.partition().to_path_buf()));
            }
            let warning = Warning::PartitionNodeNotConfirmed(spec.partition().to_path_buf());
            warn!("{warning}");
            warnings.push(warning);
        }
        self.advance(Stage::Partitioned);

        let request = FormatRequest::new(spec.partition(), label);
        format(self.host, &tool, &request)?;
        self.advance(Stage::Formatted);

        Ok(Report {
            device: device.path().to_path_buf(),
            table: spec.table(),
            partition: spec.partition().to_path_buf(),
            confirmed,
            label: request.label().clone(),
            unmounted,
            warnings,
        })
    }

    fn advance(&mut self, stage: Stage) {
        info!(from = %self.stage, to = %stage, "stage");
        self.stage = stage;
    }
}

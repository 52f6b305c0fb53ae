mod cli;
mod logic;
mod ui;

use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use ratatui::widgets::TableState;
use ratatui_elm::App;
use std::{
    os::unix::process::CommandExt,
    path::PathBuf,
    process::{Command, ExitCode},
    sync::mpsc::{self, Sender},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tui_input::Input;
use usb_format::{
    BlockDevice, Options, Pipeline, Validated, VolumeLabel, system::System,
};

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = cli::parse();

    init_logging(cli.debug)?;

    let host = System;

    if cli.list {
        let pipeline = Pipeline::new(&host, Options::default())?;
        let devices = pipeline.scan().context("failed to scan devices")?;
        if devices.is_empty() {
            eprintln!("No removable devices found");
            return Ok(ExitCode::FAILURE);
        }
        print_devices(&devices);
        return Ok(ExitCode::SUCCESS);
    }

    ensure_root()?;

    let mut pipeline = Pipeline::new(
        &host,
        Options {
            strict: cli.strict,
            ..Options::default()
        },
    )?;

    let device = match cli.device {
        Some(device) => device,
        None => {
            let devices = pipeline.scan().context("failed to scan devices")?;
            if devices.is_empty() {
                return Err(eyre!("no removable devices found"));
            }
            match select_device(devices)? {
                Some(device) => device,
                None => {
                    info!("cancelled");
                    return Ok(ExitCode::SUCCESS);
                }
            }
        }
    };

    let validated = pipeline.validate(&device)?;

    let label = cli.label.as_deref().map(VolumeLabel::new);
    let label = if cli.force {
        label.unwrap_or_default()
    } else {
        match confirm(&validated, label)? {
            Some(label) => label,
            None => {
                info!("cancelled");
                return Ok(ExitCode::SUCCESS);
            }
        }
    };

    let report = pipeline
        .run(validated.device.path(), label)
        .with_context(|| format!("failed to format {}", device.display()))?;

    println!(
        "Formatted {} ({} table) as FAT32 with label {}",
        report.partition.display(),
        report.table,
        report.label
    );
    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    Ok(ExitCode::SUCCESS)
}

fn init_logging(debug: bool) -> Result<()> {
    if debug {
        let file = std::fs::File::create("usb-format.log").context("failed to create log file")?;
        tracing_subscriber::fmt()
            .with_writer(file)
            .with_ansi(false)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
    Ok(())
}

/// Re-runs the current command line under `sudo` unless already root.
fn ensure_root() -> Result<()> {
    if nix::unistd::Uid::effective().is_root() {
        return Ok(());
    }

    let exe = std::env::current_exe().context("failed to locate own executable")?;
    info!("root privileges required, re-running under sudo");
    let err = Command::new("sudo")
        .arg("--")
        .arg(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).context("usb-format must be run as root and sudo could not be started")
}

fn print_devices(devices: &[BlockDevice]) {
    for (i, d) in devices.iter().enumerate() {
        println!(
            "{:>2}) {:<16} {:>10}  {:<20} {:<11} {}",
            i + 1,
            d.path().display(),
            format!("{:#.1}", d.size()),
            d.model().unwrap_or("-"),
            d.label().unwrap_or("-"),
            d.mount_point()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not mounted".into()),
        );
    }
}

struct SelectState {
    devices: Vec<BlockDevice>,
    table: TableState,
    status: Option<String>,
    tx: Sender<PathBuf>,
}

/// Everything the confirmation screen shows, rendered to text up front.
struct ConfirmState {
    target: String,
    details: Vec<String>,
    warnings: Vec<String>,
    label: VolumeLabel,
    /// Set while the label is being edited.
    input: Option<Input>,
    tx: Sender<VolumeLabel>,
}

fn select_device(devices: Vec<BlockDevice>) -> Result<Option<PathBuf>> {
    let (tx, rx) = mpsc::channel();
    let state = SelectState {
        devices,
        table: TableState::new().with_selected(Some(0)),
        status: None,
        tx,
    };

    App::new_with(state, logic::update_select, ui::view_select).run()?;

    Ok(rx.try_recv().ok())
}

/// Asks for a label (unless one is given) and a final yes. `None` means cancelled.
fn confirm(validated: &Validated, label: Option<VolumeLabel>) -> Result<Option<VolumeLabel>> {
    let device = &validated.device;
    let mut details = vec![format!("Size: {:#.1}", device.size())];
    if let Some(model) = device.model() {
        details.push(format!("Model: {model}"));
    }
    if let Some(label) = device.label() {
        details.push(format!("Current label: {label}"));
    }
    if let Some(fs) = device.fs_type() {
        details.push(format!("Current filesystem: {fs}"));
    }
    if let Some(mount) = device.mount_point() {
        details.push(format!("Mounted at {} (will be unmounted)", mount.display()));
    }

    let (tx, rx) = mpsc::channel();
    let state = ConfirmState {
        target: device.path().display().to_string(),
        details,
        warnings: validated.warnings.iter().map(ToString::to_string).collect(),
        input: label
            .is_none()
            .then(|| Input::new(VolumeLabel::default().to_string())),
        label: label.unwrap_or_default(),
        tx,
    };

    App::new_with(state, logic::update_confirm, ui::view_confirm).run()?;

    Ok(rx.try_recv().ok())
}

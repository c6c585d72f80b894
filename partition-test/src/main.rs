// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{fs, io, path::Path, time::Duration};

use disks::{HardwareFacts, Inventory, NamingScheme};
use log::{debug, info, warn};
use miette::IntoDiagnostic;
use partitioning::SessionConfig;
use provisioning::{check_hardware, Config, FilesystemType, FormatCommand, PartitionPlan};

/// Backing file for the rehearsal run
const IMAGE: &str = "partition-test.img";

/// Disk the plan is built for when no supported disk is attached
const FALLBACK_DISK: &str = "vda";

/// Creates a sparse file at `path` with the given size in bytes
fn create_sparse_file<P>(path: P, size: u64) -> io::Result<()>
where
    P: AsRef<Path>,
{
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(size)?;
    Ok(())
}

fn main() -> miette::Result<()> {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Debug)
        .init();
    info!("Starting partition planning demo");

    let config = Config::default().with_session(SessionConfig::default().with_exit_timeout(Duration::from_secs(2)));

    let facts = HardwareFacts::probe().map_err(provisioning::Error::from)?;
    info!(
        "Hardware: {} firmware, {} kB memory, {:?} CPU",
        facts.firmware, facts.total_memory_kb, facts.cpu_vendor
    );
    if let Err(e) = check_hardware(&facts) {
        warn!("{e}");
    }

    // Plan for the first disk we know how to name
    let disks = match config.lsblk.list_physical_disks() {
        Ok(disks) => disks,
        Err(e) => {
            warn!("Unable to list disks: {e}");
            vec![]
        }
    };
    for disk in &disks {
        info!("  └─{} {} {}", disk.name, disk.size, disk.label);
    }
    let disk = disks
        .iter()
        .map(|d| d.name.as_str())
        .find(|name| NamingScheme::detect(name).is_some())
        .unwrap_or(FALLBACK_DISK);

    let plan = PartitionPlan::automatic(disk, &facts, FilesystemType::Btrfs)?;
    println!("{}", plan.to_json()?);

    for command in FormatCommand::for_plan(&plan) {
        debug!("Would run: {command}");
    }
    for path in plan.mount_paths(&config.mount_root) {
        debug!("Would mount: {}", path.display());
    }

    // Rehearse the plan against a sparse image instead of the disk
    let image_size = 20 * 1024 * 1024 * 1024;
    info!("Creating {}GB sparse image file", image_size / (1024 * 1024 * 1024));
    create_sparse_file(IMAGE, image_size).into_diagnostic()?;

    let result = config.executor().apply_to(plan.confirm()?, Path::new(IMAGE));

    info!("Cleaning up resources");
    fs::remove_file(IMAGE).into_diagnostic()?;
    result?;

    info!("Demo completed successfully");
    Ok(())
}

// Copyright © 2019 Intel Corporation
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

#[cfg(test)]
mod test_util;

use std::path::PathBuf;
use std::process;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use guest_vmm::cli_print_error_chain;
use log::{info, LevelFilter};
use thiserror::Error;
use vmm::archive::{ArchiveError, CpioArchive};
use vmm::board::{self, BoardConfig, DEFAULT_BOARD};
use vmm::hosted::HostedHypervisor;
use vmm::machine::{GuestConfig, SenderTag};
use vmm::vm::{BootContext, DEFAULT_DTB_NAME, DEFAULT_KERNEL_NAME};
use vmm::Vmm;

const DEFAULT_VM_NAME: &str = "Linux";
const DEFAULT_PRIORITY: &str = "100";
// Tag carried by every fault message of the single guest.
const GUEST_TAG: SenderTag = SenderTag(1 << 0);

#[derive(Debug, Error)]
enum Error {
    #[error("Failed to open the boot archive")]
    Archive(#[source] ArchiveError),

    #[error("No boot archive given")]
    NoArchive,

    #[error("Failed to set up the board")]
    Board(#[source] board::Error),

    #[error("Failed to boot the guest")]
    Boot(#[source] vmm::Error),

    #[error("Monitor halted")]
    Halted(#[source] vmm::Error),
}

fn create_app() -> Command {
    // Keep the arguments in alphabetical order.
    Command::new("guest-vmm")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Boot a single Linux guest from a boot archive and serve its faults.")
        .arg(
            Arg::new("archive")
                .long("archive")
                .help("cpio (newc) archive holding the kernel and device tree")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .required(true),
        )
        .arg(
            Arg::new("board")
                .long("board")
                .help("Built-in board profile")
                .num_args(1)
                .default_value(DEFAULT_BOARD),
        )
        .arg(
            Arg::new("board-config")
                .long("board-config")
                .help("JSON board profile, overrides --board")
                .num_args(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("boot-only")
                .long("boot-only")
                .help("Exit once the guest is started instead of serving its faults")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dtb")
                .long("dtb")
                .help("Name of the device tree blob in the archive")
                .num_args(1)
                .default_value(DEFAULT_DTB_NAME),
        )
        .arg(
            Arg::new("kernel")
                .long("kernel")
                .help("Name of the kernel image in the archive")
                .num_args(1)
                .default_value(DEFAULT_KERNEL_NAME),
        )
        .arg(
            Arg::new("priority")
                .long("priority")
                .help("Scheduling priority of the guest")
                .num_args(1)
                .value_parser(value_parser!(u8))
                .default_value(DEFAULT_PRIORITY),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .help("Sets the level of debugging output")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("vm-name")
                .long("vm-name")
                .help("Name of the guest")
                .num_args(1)
                .default_value(DEFAULT_VM_NAME),
        )
}

fn log_level(matches: &ArgMatches) -> LevelFilter {
    match matches.get_count("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn load_board(matches: &ArgMatches) -> Result<BoardConfig, Error> {
    let board = match matches.get_one::<PathBuf>("board-config") {
        Some(path) => BoardConfig::from_file(path),
        // The default value guarantees the argument is present.
        None => BoardConfig::by_name(
            matches
                .get_one::<String>("board")
                .map_or(DEFAULT_BOARD, String::as_str),
        ),
    };
    board.map_err(Error::Board)
}

fn start_vmm(matches: &ArgMatches) -> Result<(), Error> {
    let board = load_board(matches)?;
    board.validate().map_err(Error::Board)?;

    let path = matches
        .get_one::<PathBuf>("archive")
        .ok_or(Error::NoArchive)?;
    let archive = CpioArchive::from_file(path).map_err(Error::Archive)?;

    let config = GuestConfig {
        name: matches
            .get_one::<String>("vm-name")
            .cloned()
            .unwrap_or_else(|| DEFAULT_VM_NAME.to_owned()),
        priority: matches.get_one::<u8>("priority").copied().unwrap_or(100),
        tag: GUEST_TAG,
    };

    let mut ctx = BootContext::new(&archive, &board);
    if let Some(kernel) = matches.get_one::<String>("kernel") {
        ctx.kernel_name = kernel.as_str();
    }
    if let Some(dtb) = matches.get_one::<String>("dtb") {
        ctx.dtb_name = dtb.as_str();
    }

    let mut vmm = Vmm::new(config);
    vmm.boot(&HostedHypervisor::new(), &ctx)
        .map_err(Error::Boot)?;

    if matches.get_flag("boot-only") {
        info!("Guest started, not serving faults");
        vmm.shutdown();
        return Ok(());
    }

    Err(Error::Halted(vmm.control_loop()))
}

fn main() {
    let matches = create_app().get_matches();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_level(&matches).as_str()),
    )
    .init();

    if let Err(e) = start_vmm(&matches) {
        cli_print_error_chain(&e, "guest-vmm");
        process::exit(1);
    }
}

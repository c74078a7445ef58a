// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Remote computer-control agent.
///
/// Exposes screenshots, input synthesis, window management, filesystem I/O,
/// shell execution, clipboard and system info to a trusted local REST
/// client and, when configured, to a cloud control server over a single
/// outbound WebSocket.
#[derive(Debug, Parser)]
#[command(name = "screencontrol", version, about, long_about = None)]
pub struct Cli {
    /// Run as a background service (under systemd / launchd / SCM)
    #[arg(long)]
    pub daemon: bool,

    /// Run attached to the console (default when started by hand)
    #[arg(long)]
    pub console: bool,

    /// Override the local REST port from the configuration
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Explicit configuration file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print service installation instructions and exit
    #[arg(long)]
    pub install: bool,

    /// Print service removal instructions and exit
    #[arg(long)]
    pub uninstall: bool,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

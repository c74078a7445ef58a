// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Service scaffolding (unit files, SCM entries) is owned by the
    // installer packages; the flags print what the operator needs.
    if cli.install {
        print_install_instructions();
        return Ok(());
    }
    if cli.uninstall {
        print_uninstall_instructions();
        return Ok(());
    }

    init_logging(cli.verbose, cli.log.as_deref());

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(screencontrol_config::default_config_path);
    let mut config = screencontrol_config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.http_port = port;
    }

    info!(
        version = screencontrol_node::AGENT_VERSION,
        machine_id = screencontrol_config::machine_id(),
        daemon = cli.daemon,
        "screencontrol agent starting"
    );

    screencontrol_node::run(config, config_path).await?;
    Ok(())
}

fn init_logging(verbosity: u8, log_file: Option<&Path>) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(path) = log_file {
        if let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(false)
                        .with_writer(std::sync::Mutex::new(file)),
                )
                .with(filter)
                .try_init();
            return;
        }
        eprintln!("could not open log file {}, logging to stderr", path.display());
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn print_install_instructions() {
    #[cfg(target_os = "linux")]
    println!(
        "Install as a systemd service:\n\n\
           sudo install -m 755 $(which screencontrol) /usr/local/bin/screencontrol\n\
           sudo tee /etc/systemd/system/screencontrol.service <<'EOF'\n\
         [Unit]\n\
         Description=ScreenControl agent\n\
         After=network-online.target\n\n\
         [Service]\n\
         ExecStart=/usr/local/bin/screencontrol --daemon\n\
         Restart=on-failure\n\n\
         [Install]\n\
         WantedBy=multi-user.target\n\
         EOF\n\
         sudo systemctl enable --now screencontrol"
    );
    #[cfg(target_os = "macos")]
    println!(
        "Install as a launchd daemon: place a plist running\n\
         `screencontrol --daemon` in /Library/LaunchDaemons and run\n\
         `sudo launchctl load -w /Library/LaunchDaemons/com.screencontrol.agent.plist`."
    );
    #[cfg(target_os = "windows")]
    println!(
        "Install as a Windows service:\n\n\
           sc create ScreenControl binPath= \"screencontrol.exe --daemon\" start= auto\n\
           sc start ScreenControl"
    );
}

fn print_uninstall_instructions() {
    #[cfg(target_os = "linux")]
    println!(
        "Remove the systemd service:\n\n\
           sudo systemctl disable --now screencontrol\n\
           sudo rm /etc/systemd/system/screencontrol.service"
    );
    #[cfg(target_os = "macos")]
    println!(
        "Remove the launchd daemon with `sudo launchctl unload` and delete\n\
         the plist from /Library/LaunchDaemons."
    );
    #[cfg(target_os = "windows")]
    println!("Remove the Windows service:\n\n  sc stop ScreenControl\n  sc delete ScreenControl");
}

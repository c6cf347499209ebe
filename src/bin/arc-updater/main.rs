//! arc-updater CLI entry point.

mod cli;

use arc_updater::{UpdateController, VERSION};
use clap::Parser;
use cli::Cli;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.to_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("arc-updater v{VERSION}");

    let controller = UpdateController::from_config(&config, cli.current_version.clone())?;

    let Some(update) = controller.check_for_update().await? else {
        info!("Arc Scanner {} is up to date", controller.current_version());
        return Ok(());
    };
    info!(
        "Arc Scanner {} is available: {}",
        update.version, update.release_url
    );
    if cli.check_only {
        return Ok(());
    }

    // Ctrl-C cancels the download
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let last_logged = AtomicU8::new(0);
    let extracted = controller
        .download_update(
            |percent| {
                if percent >= last_logged.load(Ordering::Relaxed).saturating_add(10)
                    || percent == 100
                {
                    last_logged.store(percent, Ordering::Relaxed);
                    info!("Downloading: {percent}%");
                }
            },
            &cancel,
        )
        .await?;

    if !cli.yes {
        info!(
            "Update {} unpacked cleanly at {}; run again with --yes to install",
            update.version,
            extracted.display()
        );
        controller.dismiss().await?;
        return Ok(());
    }

    let mut exit = controller.exit_requested();
    controller.apply_update_and_restart()?;
    exit.wait_for(|requested| *requested).await?;

    info!("Exiting so the update can be installed");
    Ok(())
}

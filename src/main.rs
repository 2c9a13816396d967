use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use tradecore::app::{Command, Config, Supervisor};
use tradecore::cli::{Cli, Commands};
use tradecore::core::domain::TradingMode;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.init_logging();

    let result = match cli.command {
        Commands::CheckConfig => {
            info!("configuration is valid");
            Ok(())
        }
        Commands::Run(args) => {
            if args.force_paper {
                config.mode = TradingMode::Paper;
            }
            run(config, args.autostart).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run(config: tradecore::app::Config, autostart: bool) -> tradecore::error::Result<()> {
    info!(mode = %config.mode, "tradecore bootstrapping");
    let supervisor = Supervisor::bootstrap(&config).await?;

    tradecore::core::service::messaging::spawn(config.telegram.clone(), supervisor.event_sender(), supervisor.handle());

    if autostart {
        let command_tx = supervisor.command_sender();
        tokio::spawn(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            let _ = command_tx
                .send(tradecore::app::supervisor::CommandRequest {
                    command: Command::Start,
                    ack: tx,
                })
                .await;
            if let Ok(Err(denial)) = rx.await {
                error!(?denial, "autostart denied");
            }
        });
    }

    tokio::select! {
        result = supervisor.run() => result?,
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("tradecore stopped");
    Ok(())
}

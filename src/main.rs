use anyhow::Result;
use campus_chat::{
    ChatClientHandle, ChatEvent, ChatTransportClient,
    cli::Args,
    config::Config,
    formatter::{MessageFormatter, OutputFormat},
    monitoring::{HealthStatus, setup_metrics},
    tracing_setup::setup_tracing,
    ui::{UIController, UIOptions, emit},
};
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const HELP: &str = "commands: /reconnect /disconnect /ping /status /token <value> /quit";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_tracing(&args.log_level, args.json_logs)?;

    info!("Starting campus chat client v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_args(&args)?);

    if config.metrics.enabled {
        setup_metrics(config.metrics.port).await?;
        info!("Metrics server started on port {}", config.metrics.port);
    }

    if args.token.is_none() {
        warn!("No token supplied; use /token <value> to authenticate");
    }

    let (handle, events, client_task) = ChatTransportClient::spawn(config.clone(), args.token.clone())?;

    let mut ui = UIController::new(
        events,
        UIOptions {
            format: config.output.format,
            colored: config.output.colored,
            quiet: config.output.quiet,
        },
    );
    let ui_task = tokio::spawn(async move { ui.run().await });

    if !config.output.quiet {
        println!("{HELP}");
    }

    tokio::select! {
        result = input_loop(&handle, &config) => {
            if let Err(e) = result {
                error!("Input loop error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
        }
    }

    // the client may already be gone; either way it ends up stopped
    let _ = handle.shutdown();
    drop(handle);
    if let Err(e) = client_task.await {
        error!("Chat client task failed: {}", e);
    }
    let _ = ui_task.await;

    info!("Client stopped successfully");
    Ok(())
}

async fn input_loop(handle: &ChatClientHandle, config: &Config) -> Result<()> {
    let mut echo = MessageFormatter::new(config.output.format, config.output.colored);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(cmd, rest)| (cmd, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => println!("{HELP}"),
            ("/reconnect", _) => handle.reconnect()?,
            ("/disconnect", _) => handle.disconnect()?,
            ("/ping", _) => handle.send_ping()?,
            ("/status", _) => {
                let status = handle.status().await;
                println!("{}", HealthStatus::from(&status).to_json());
            }
            ("/token", token) => {
                let token = (!token.is_empty()).then(|| token.to_string());
                handle.set_token(token)?;
            }
            _ => {
                let message = ChatEvent::user(line);
                if handle.send_message(&message.content).await {
                    if !config.output.quiet && config.output.format != OutputFormat::Text {
                        emit(&echo.render_message(&message));
                    }
                } else {
                    println!("Not connected; message not sent. Try /reconnect or /status.");
                }
            }
        }
    }

    Ok(())
}

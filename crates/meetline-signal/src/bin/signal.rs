//! Meetline Signal Server
//!
//! WebRTC signaling relay plus the `/send-invite` mail endpoint.
//!
//! # Usage
//!
//! ```bash
//! EMAIL_USER=me@gmail.com EMAIL_PASS=app-password meetline-signal --port 5000
//!
//! # With a config file
//! meetline-signal --config /etc/meetline/config.toml
//!
//! # Write a default config file to edit
//! meetline-signal --init-config
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meetline_core::config::{EMAIL_PASS_ENV, EMAIL_USER_ENV};
use meetline_core::Config;
use meetline_signal::{SignalServer, SmtpMailer};

#[derive(Parser, Debug)]
#[command(name = "meetline-signal")]
#[command(about = "WebRTC signaling relay and meeting invitation mailer")]
#[command(version)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Browser origin allowed by CORS ("*" for any)
    #[arg(long)]
    cors_origin: Option<String>,

    /// Sender address and SMTP username
    #[arg(long, env = EMAIL_USER_ENV)]
    email_user: Option<String>,

    /// SMTP password
    #[arg(long, env = EMAIL_PASS_ENV, hide_env_values = true)]
    email_pass: Option<String>,

    /// SMTP relay host
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    /// SMTP submission port
    #[arg(long, env = "SMTP_PORT")]
    smtp_port: Option<u16>,

    /// Base URL of the meeting web app
    #[arg(long, env = "MEETING_BASE_URL")]
    meeting_base_url: Option<String>,

    /// Print a sample config file and exit
    #[arg(long)]
    print_config: bool,

    /// Write the default config to the config path and exit
    #[arg(long, conflicts_with = "print_config")]
    init_config: bool,
}

impl Args {
    /// Load the config file and apply flag/env overrides
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::load(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(origin) = self.cors_origin {
            config.server.cors_origin = origin;
        }
        if let Some(user) = self.email_user {
            config.mail.sender = Some(user);
        }
        if let Some(pass) = self.email_pass {
            config.mail.password = Some(pass);
        }
        if let Some(host) = self.smtp_host {
            config.mail.smtp_host = host;
        }
        if let Some(port) = self.smtp_port {
            config.mail.smtp_port = port;
        }
        if let Some(url) = self.meeting_base_url {
            config.mail.meeting_base_url = url;
        }

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();

    if args.print_config {
        print!("{}", Config::sample());
        return Ok(());
    }

    if args.init_config {
        let path = match args.config.clone().or_else(Config::default_path) {
            Some(path) => path,
            None => anyhow::bail!("no config directory found, pass --config"),
        };
        Config::default()
            .save_to(&path)
            .with_context(|| format!("writing config to {}", path.display()))?;
        return Ok(());
    }

    let config = args.into_config()?;

    // Fail fast: without credentials no invitation can ever be sent
    let credentials = match config.mail.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mailer = SmtpMailer::new(&config.mail, credentials).context("configuring SMTP mailer")?;

    info!("Starting Meetline Signal Server");
    info!("Listening on {}", config.server.socket_addr());

    let server = SignalServer::new(config.server, Arc::new(mailer));
    server.serve().await?;

    Ok(())
}

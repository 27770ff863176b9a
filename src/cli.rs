//! Command-line entrypoint for applications built on the SDK.

use crate::app::ApplicationBuilder;
use crate::config::AppConfig;
use crate::error::StartupError;
use crate::telemetry;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Run a mosaic application")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the application for local development
    DevServer(DevServerArgs),
}

/// Overrides of the resolved settings. Unset flags keep the resolved value.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct DevServerArgs {
    /// Listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port
    #[arg(long)]
    pub port: Option<u16>,

    /// Debug logging (`--debug` or `--debug=false`)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub debug: Option<bool>,

    /// Runtime worker threads
    #[arg(long)]
    pub workers: Option<usize>,
}

impl DevServerArgs {
    pub fn apply(&self, config: &AppConfig) -> AppConfig {
        let mut config = config.clone();
        if let Some(host) = &self.host {
            config.listen_host = host.clone();
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config
    }
}

impl Cli {
    /// Run the parsed command against the application described by `builder`.
    pub fn run(self, builder: ApplicationBuilder) -> Result<(), StartupError> {
        match self.command {
            Command::DevServer(args) => dev_server(builder, &args),
        }
    }
}

/// Load `.env`, resolve settings, apply `args`, then start and serve on a runtime with
/// `workers` threads.
pub fn dev_server(builder: ApplicationBuilder, args: &DevServerArgs) -> Result<(), StartupError> {
    let dotenv = dotenvy::dotenv();
    let app = builder.build()?;
    let config = args.apply(app.config());
    let app = app.with_config(config)?;
    telemetry::init(app.config().debug);
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(app.config().workers)
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let running = app.start().await?;
        running.serve().await
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DevServerArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::DevServer(args) => args,
        }
    }

    #[test]
    fn flags_override_only_when_given() {
        let base = AppConfig::default();
        let args = parse(&["app", "dev-server", "--port", "8080"]);
        let applied = args.apply(&base);
        assert_eq!(applied.listen_port, 8080);
        assert_eq!(applied.listen_host, base.listen_host);
        assert_eq!(applied.workers, base.workers);
        assert!(!applied.debug);
    }

    #[test]
    fn debug_flag_takes_an_optional_value() {
        assert_eq!(parse(&["app", "dev-server", "--debug"]).debug, Some(true));
        assert_eq!(parse(&["app", "dev-server", "--debug=false"]).debug, Some(false));
        assert_eq!(parse(&["app", "dev-server"]).debug, None);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["app", "serve"]).is_err());
    }
}

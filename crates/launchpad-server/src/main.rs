use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use launchpad_core::{LoggingConfig, OrchestratorConfig};
use launchpad_server::{build_handler, Ports, RequestHandler};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONFIG_ENV: &str = "LAUNCHPAD_CONFIG";

fn cli() -> Command {
    Command::new("launchpad")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Agent sandbox testing, sign-in and production deployment")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file (default: $LAUNCHPAD_CONFIG)"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Read newline-delimited JSON requests on stdin, write envelopes to stdout"),
        )
        .subcommand(
            Command::new("handle")
                .about("Handle a single JSON request")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .short('f')
                        .value_parser(value_parser!(PathBuf))
                        .help("Request file (default: stdin)"),
                )
                .arg(
                    Arg::new("pretty")
                        .long("pretty")
                        .action(ArgAction::SetTrue)
                        .help("Pretty-print the envelope"),
                ),
        )
        .subcommand(Command::new("check").about("Load and validate the configuration"))
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<OrchestratorConfig> {
    let path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = match path {
        Some(path) => OrchestratorConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    // stdout carries envelopes
    let base = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if logging.json {
        registry.with(base.json()).try_init()
    } else {
        registry.with(base).try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing already initialized: {err}");
    }
}

async fn serve(handler: &RequestHandler) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    tracing::info!("serving requests from stdin");
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = handler.handle_json(&line).await;
        let mut out = envelope.to_json_line();
        out.push('\n');
        stdout.write_all(out.as_bytes()).await.context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }
    tracing::info!("stdin closed");
    Ok(())
}

async fn handle_one(handler: &RequestHandler, args: &ArgMatches) -> anyhow::Result<bool> {
    let raw = match args.get_one::<PathBuf>("file") {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading request from {}", path.display()))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("reading request from stdin")?;
            raw
        }
    };
    let envelope = handler.handle_json(&raw).await;
    let out = if args.get_flag("pretty") {
        serde_json::to_string_pretty(&envelope)?
    } else {
        envelope.to_json_line()
    };
    println!("{out}");
    Ok(envelope.success)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    init_tracing(&config.logging);

    match matches.subcommand() {
        Some(("check", _)) => {
            println!(
                "configuration ok (hosted login: {}, region: {})",
                if config.identity.hosted.is_some() { "configured" } else { "disabled" },
                config.deploy.region
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(("serve", _)) => {
            let handler = build_handler(&config, Ports::from_config(&config)?);
            serve(&handler).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(("handle", args)) => {
            let handler = build_handler(&config, Ports::from_config(&config)?);
            let success = handle_one(&handler, args).await?;
            Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        _ => {
            cli().print_help()?;
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn config_flag_is_global() {
        let matches = cli()
            .try_get_matches_from(["launchpad", "handle", "--config", "/tmp/launchpad.toml"])
            .unwrap();
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("/tmp/launchpad.toml"))
        );
    }
}

use anyhow::Context;
use sessiond::config::{SessionProfile, SessiondConfig};
use sessiond::probe::UnitServiceProbe;
use sessiond::session::{ProcessLauncher, SessionCoordinator};
use sessiond::telemetry;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

enum CliCommand {
    Run { profile_path: Option<String> },
    Validate { profiles: Vec<String> },
    Help,
    ValidateHelp,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("sessiond: {err:#}");
            // Startup/configuration failures share the environment-missing
            // exit code: nothing was ever launched.
            ExitCode::from(2)
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    match parse_cli_args()? {
        CliCommand::Run { profile_path } => {
            let mut config = SessiondConfig::load().context("failed to load configuration")?;
            if let Some(path) = profile_path {
                config.profile_path = Some(path);
            }

            let Some(path) = config.profile_path.as_deref() else {
                anyhow::bail!(
                    "no session profile supplied; pass -c <PROFILE> or set SESSIOND__PROFILE_PATH"
                );
            };

            let profile = SessionProfile::from_path(Path::new(path))
                .with_context(|| format!("invalid session profile {path}"))?;

            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown signal received");
                    signal_token.cancel();
                }
            });

            let probe = Arc::new(UnitServiceProbe::new(config.probe.command.clone()));
            let coordinator = SessionCoordinator::new(profile, probe, Arc::new(ProcessLauncher))
                .with_shutdown(shutdown);

            let verdict = coordinator.run().await;
            Ok(ExitCode::from(verdict.exit_code()))
        }
        CliCommand::Validate { profiles } => run_validate_command(profiles),
        CliCommand::Help => {
            print_help();
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::ValidateHelp => {
            print_validate_help();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_cli_args() -> anyhow::Result<CliCommand> {
    let mut args = std::env::args().skip(1);
    let Some(first) = args.next() else {
        return Ok(CliCommand::Run { profile_path: None });
    };

    if first == "validate" {
        return parse_validate_args(args);
    }

    let mut profile_path = None;
    let mut pending = Some(first);

    loop {
        let arg = match pending.take() {
            Some(value) => value,
            None => match args.next() {
                Some(value) => value,
                None => break,
            },
        };

        match arg.as_str() {
            "-c" | "--config" => {
                if profile_path.is_some() {
                    anyhow::bail!("session profile path specified multiple times");
                }
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("expected path after {arg}"))?;
                profile_path = Some(value);
            }
            "-h" | "--help" => return Ok(CliCommand::Help),
            other => anyhow::bail!("unrecognised argument `{other}`"),
        }
    }

    Ok(CliCommand::Run { profile_path })
}

fn parse_validate_args<I>(args: I) -> anyhow::Result<CliCommand>
where
    I: IntoIterator<Item = String>,
{
    let mut profiles = Vec::new();

    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliCommand::ValidateHelp),
            other => profiles.push(other.to_string()),
        }
    }

    if profiles.is_empty() {
        anyhow::bail!("sessiond validate requires at least one profile path");
    }

    Ok(CliCommand::Validate { profiles })
}

fn run_validate_command(profiles: Vec<String>) -> anyhow::Result<ExitCode> {
    let mut had_error = false;

    for profile in profiles {
        let path = Path::new(&profile);
        match SessionProfile::from_path(path) {
            Ok(_) => println!("validated {}", path.display()),
            Err(err) => {
                for message in &err.messages {
                    eprintln!("- {}: {message}", path.display());
                }
                had_error = true;
            }
        }
    }

    if had_error {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_help() {
    println!(
        "\
Usage: sessiond [OPTIONS]
       sessiond validate <PROFILE>...

Options:
  -c, --config <PATH>    Path to the session profile YAML file
  -h, --help             Print this help message

Exit codes:
  0  session ran and shut down cleanly
  1  fallback was engaged and the degraded launch failed
  2  environment or configuration missing
"
    );
}

fn print_validate_help() {
    println!(
        "\
Usage: sessiond validate <PROFILE>...

Options:
  -h, --help             Print this help message
"
    );
}

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use hero_cli::{run, ClientOptions, CommandKind};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        println!("{}", usage_text());
        return Ok(());
    }

    let mut options = ClientOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--port" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --port".to_string())?;
                options.port = value
                    .parse::<u16>()
                    .map_err(|_| format!("invalid --port value '{value}' (expected u16)"))?;
                index += 2;
            }
            "--timeout-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --timeout-ms".to_string())?;
                options.timeout_ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --timeout-ms value '{value}' (expected u64)"))?;
                index += 2;
            }
            "--retry-ms" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --retry-ms".to_string())?;
                options.retry_ms = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid --retry-ms value '{value}' (expected u64)"))?;
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "wait-ready" => {
            expect_args(command, command_args, 0)?;
            CommandKind::WaitReady
        }
        "send" => {
            let (name, rest) = command_args
                .split_first()
                .ok_or_else(|| "send requires a command name".to_string())?;
            let data = if rest.is_empty() {
                JsonValue::Null
            } else {
                let raw = rest.join(" ");
                serde_json::from_str(&raw)
                    .map_err(|error| format!("invalid JSON data for '{name}': {error}"))?
            };
            CommandKind::Send {
                command: name.clone(),
                data,
            }
        }
        "load" => {
            expect_args(command, command_args, 1)?;
            CommandKind::Load {
                path: PathBuf::from(&command_args[0]),
            }
        }
        "reset" => {
            expect_args(command, command_args, 0)?;
            CommandKind::Reset
        }
        "script" => {
            expect_args(command, command_args, 1)?;
            CommandKind::Script {
                path: PathBuf::from(&command_args[0]),
            }
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout()).map_err(|error| error.to_string())
}

fn expect_args(command: &str, args: &[String], count: usize) -> Result<(), String> {
    if args.len() == count {
        return Ok(());
    }
    match count {
        0 => Err(format!("{command} takes no arguments")),
        1 => Err(format!("{command} requires exactly one file path")),
        _ => Err(format!("{command} takes {count} arguments")),
    }
}

fn usage_text() -> String {
    [
        "hero_cli - command client for the dungeon thruport",
        "",
        "Usage:",
        "  hero_cli [--port <u16>] [--timeout-ms <u64>] [--retry-ms <u64>] wait-ready",
        "  hero_cli [--port <u16>] [--timeout-ms <u64>] [--retry-ms <u64>] send <command> [json]",
        "  hero_cli [--port <u16>] [--timeout-ms <u64>] [--retry-ms <u64>] load <level.json>",
        "  hero_cli [--port <u16>] [--timeout-ms <u64>] [--retry-ms <u64>] reset",
        "  hero_cli [--port <u16>] [--timeout-ms <u64>] [--retry-ms <u64>] script <file>",
        "",
        "Script lines are `<command> [json]`; blank lines and `#` comments are skipped.",
        "",
        "Defaults:",
        "  --port 3000",
        "  --timeout-ms 35000",
        "  --retry-ms 100",
    ]
    .join("\n")
}

//! solar-zones entry point: CLI wiring and config-driven pipeline construction.

use std::path::Path;
use std::process;

use tracing_subscriber::EnvFilter;

use solar_zones::config::PipelineConfig;
use solar_zones::pipeline::{Pipeline, Stage};

/// Parsed CLI arguments.
struct CliArgs {
    config_path: Option<String>,
    stage: Stage,
    offline: bool,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn print_help() {
    eprintln!("solar-zones: city-scale rooftop PV zoning, simulation and QA");
    eprintln!();
    eprintln!("Usage: solar-zones [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>          Load pipeline config from TOML file");
    eprintln!("  --stage <name>           Stage to run: {}", Stage::NAMES.join(", "));
    eprintln!("  --start <YYYY-MM-DD>     Override weather.start_date");
    eprintln!("  --end <YYYY-MM-DD>       Override weather.end_date");
    eprintln!("  --offline                Use synthetic clear-sky weather instead of NASA POWER");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Without --config the built-in Bengaluru defaults are used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: None,
        stage: Stage::All,
        offline: false,
        start_date: None,
        end_date: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = Some(args[i].clone());
            }
            "--stage" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --stage requires a name argument");
                    process::exit(1);
                }
                match args[i].parse::<Stage>() {
                    Ok(stage) => cli.stage = stage,
                    Err(e) => {
                        eprintln!("error: {e}");
                        process::exit(1);
                    }
                }
            }
            "--start" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --start requires a date argument");
                    process::exit(1);
                }
                cli.start_date = Some(args[i].clone());
            }
            "--end" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --end requires a date argument");
                    process::exit(1);
                }
                cli.end_date = Some(args[i].clone());
            }
            "--offline" => {
                cli.offline = true;
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn parse_date(flag: &str, value: &str) -> chrono::NaiveDate {
    value.parse().unwrap_or_else(|_| {
        eprintln!("error: {flag} value \"{value}\" is not a YYYY-MM-DD date");
        process::exit(1);
    })
}

fn main() {
    let cli = parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match cli.config_path {
        Some(ref path) => match PipelineConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };

    if let Some(ref s) = cli.start_date {
        config.weather.start_date = parse_date("--start", s);
    }
    if let Some(ref s) = cli.end_date {
        config.weather.end_date = Some(parse_date("--end", s));
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let pipeline = match Pipeline::from_config(config, cli.offline) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("error: failed to create tokio runtime: {e}");
        process::exit(1);
    });
    match rt.block_on(pipeline.run(cli.stage)) {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

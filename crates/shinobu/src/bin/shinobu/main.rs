use std::path::PathBuf;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use shinobu::{config, replicas, ConfigError, HostConfig, Registry};

const DEFAULT_CONFIG: &str = "shinobu.toml";

struct Args {
	config: PathBuf,
	check: bool,
}

fn main() -> ExitCode {
	let args = match parse_args(std::env::args().skip(1).collect()) {
		Ok(Some(args)) => args,
		Ok(None) => {
			print_usage();
			return ExitCode::SUCCESS;
		}
		Err(msg) => {
			eprintln!("{} {}", "error:".red().bold(), msg);
			print_usage();
			return ExitCode::FAILURE;
		}
	};

	let host = match config::load(&args.config) {
		Ok(host) => host,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};

	if args.check {
		return cmd_check(&host);
	}

	let runtime = match tokio::runtime::Runtime::new() {
		Ok(rt) => rt,
		Err(e) => {
			eprintln!("{} cannot start runtime: {}", "error:".red().bold(), e);
			return ExitCode::FAILURE;
		}
	};
	runtime.block_on(run(host))
}

fn parse_args(args: Vec<String>) -> Result<Option<Args>, String> {
	let mut config = PathBuf::from(DEFAULT_CONFIG);
	let mut check = false;
	let mut iter = args.into_iter();

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"help" | "--help" | "-h" => return Ok(None),
			"--check" => check = true,
			"--config" | "-c" => {
				let path = iter.next().ok_or("--config expects a path")?;
				config = PathBuf::from(path);
			}
			other => return Err(format!("unknown argument '{}'", other)),
		}
	}

	Ok(Some(Args { config, check }))
}

fn print_usage() {
	eprintln!("{} {}: process supervisor", "shinobu".bold(), env!("CARGO_PKG_VERSION"));
	eprintln!();
	eprintln!("usage: {} [--config <path>] [--check]", "shinobu".bold());
	eprintln!();
	eprintln!("  {} <path>   Configuration file, TOML or .json (default {})", "--config".bold(), DEFAULT_CONFIG);
	eprintln!("  {}          Print every resolved replica and exit", "--check".bold());
}

fn cmd_check(host: &HostConfig) -> ExitCode {
	let mut failed = false;

	for (i, def) in host.supervise.iter().enumerate() {
		match replicas::expand(def) {
			Ok(options) => {
				println!("{} {}", format!("[{}]", i).dimmed(), def.command_line().bold());
				for opts in &options {
					println!(
						"  {} {}  {}",
						format!("#{}", opts.replica).cyan(),
						opts.command_line(),
						format!("{:?}", opts.restart_policy).dimmed()
					);
					for (key, value) in &opts.env {
						println!("      {}={}", key.dimmed(), value);
					}
				}
			}
			Err(e) => {
				failed = true;
				print_config_error(i, def.command_line(), &e);
			}
		}
	}

	if failed {
		ExitCode::FAILURE
	} else {
		ExitCode::SUCCESS
	}
}

fn print_config_error(index: usize, command: String, err: &ConfigError) {
	eprintln!(
		"{} {} {}: {}",
		"error:".red().bold(),
		format!("[{}]", index).dimmed(),
		command,
		err
	);
}

async fn run(host: HostConfig) -> ExitCode {
	tracing_subscriber::fmt().init();

	let registry = Registry::new(host.supervisor_config());

	for (i, def) in host.supervise.iter().enumerate() {
		if let Err(e) = registry.provision(def).await {
			tracing::error!(definition = i, command = %def.command_line(), error = %e, "cannot provision");
			return ExitCode::FAILURE;
		}
	}

	if registry.is_empty().await {
		tracing::warn!("nothing to supervise");
		return ExitCode::SUCCESS;
	}

	registry.start_all().await;
	wait_for_shutdown().await;
	tracing::info!("shutting down");
	registry.stop_all().await;

	ExitCode::SUCCESS
}

async fn wait_for_shutdown() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut terminate = match signal(SignalKind::terminate()) {
		Ok(s) => s,
		Err(e) => {
			tracing::warn!(error = %e, "cannot listen for SIGTERM");
			let _ = tokio::signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {}
		_ = terminate.recv() => {}
	}
}

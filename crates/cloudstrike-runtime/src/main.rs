use std::time::Duration;

use clap::Parser;
use cloudstrike_client::catalog_client::CatalogClient;
use cloudstrike_client::cli::{CliArgs, Command, StartMode};
use cloudstrike_client::project_config::{self, ResolvedConfig};
use cloudstrike_core::catalog::GenerateRequest;

const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    tracing::info!("CloudStrike v{}", env!("CARGO_PKG_VERSION"));

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => fail(&format!("cannot read current directory: {}", e)),
    };
    let resolved = match project_config::resolve(&args, &cwd) {
        Ok(r) => r,
        Err(e) => fail(&e.to_string()),
    };

    if let Some(mode) = args.start_mode() {
        run_viewer(resolved, mode);
        return;
    }

    let client = CatalogClient::new(&resolved.config.catalog_url);
    match &args.command {
        // cloudstrike worlds
        Some(Command::Worlds) => match client.fetch_worlds() {
            Ok(list) => print_json(&list),
            Err(e) => fail(&e.to_string()),
        },

        // cloudstrike generate <prompt> [--seed N] [--classes X]
        Some(Command::Generate {
            prompt,
            seed,
            classes,
        }) => {
            let request = GenerateRequest {
                seed: *seed,
                classes: classes.clone(),
                ..GenerateRequest::new(prompt.as_str())
            };
            match client.trigger_generation(&request) {
                Ok(response) => print_json(&response),
                Err(e) => fail(&e.to_string()),
            }
        }

        // cloudstrike status <execution_id> [--wait]
        Some(Command::Status { execution_id, wait }) => loop {
            let status = match client.generation_status(execution_id) {
                Ok(s) => s,
                Err(e) => fail(&e.to_string()),
            };
            if !*wait || status.status.is_terminal() {
                print_json(&status);
                break;
            }
            tracing::info!("{} still {:?}", execution_id, status.status);
            std::thread::sleep(STATUS_POLL_INTERVAL);
        },

        None | Some(Command::View) | Some(Command::Upload { .. }) | Some(Command::Browse) => {}
    }
}

fn run_viewer(resolved: ResolvedConfig, mode: StartMode) {
    let event_loop = match winit::event_loop::EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => fail(&format!("failed to create event loop: {}", e)),
    };
    event_loop.set_control_flow(winit::event_loop::ControlFlow::Poll);

    let mut engine = match cloudstrike_client::engine::Engine::new(resolved, mode) {
        Ok(engine) => engine,
        Err(e) => fail(&e.to_string()),
    };

    if let Err(e) = event_loop.run_app(&mut engine) {
        fail(&format!("event loop error: {}", e));
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => fail(&e.to_string()),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

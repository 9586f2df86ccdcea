//! Interactive shell and process entry point: a one-shot `clap` command for
//! scripting plus a REPL loop for interactive use, both dispatching to
//! `edurouter_core`. Deliberately thin — command parsing and interface
//! bring-up are the only responsibilities here.

use std::io::{self, BufRead, Write};
use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use edurouter_core::config::parse_interface_config;
use edurouter_core::route::Route;
use edurouter_core::Orchestrator;

#[derive(Parser)]
#[command(name = "edurouter", about = "An educational userspace IPv4 router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Bring up an interface: `name:IPv4/prefix`, e.g. `eth0:192.168.0.1/24`.
    Add { interface: String },
    /// Add a route: `link-local <network> <out-interface>` or
    /// `static <network> <out-interface> <next-hop>`.
    Route {
        #[command(subcommand)]
        action: RouteCommand,
    },
    /// List configured interfaces and routes.
    List,
    /// Send `count` ICMP echo requests to `target`.
    Ping {
        target: Ipv4Addr,
        #[arg(default_value_t = 4)]
        count: u32,
    },
    /// Print the running version.
    Version,
}

#[derive(Subcommand)]
enum RouteCommand {
    LinkLocal { network: String, out_interface: String },
    Static { network: String, out_interface: String, next_hop: Ipv4Addr },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let orchestrator = Orchestrator::new();

    match cli.command {
        Some(command) => run_command(&orchestrator, command),
        None => repl(&orchestrator),
    }

    orchestrator.shutdown();
}

/// A bare stdin prompt loop: read a line, split it the same way the
/// one-shot `clap` parser would, dispatch, repeat until EOF or `quit`.
fn repl(orchestrator: &Orchestrator) {
    let stdin = io::stdin();
    print_prompt();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("error reading stdin: {e}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            print_prompt();
            continue;
        }
        if trimmed == "quit" || trimmed == "exit" {
            break;
        }
        if trimmed == "log" || trimmed.starts_with("log ") {
            handle_log_command(trimmed);
            print_prompt();
            continue;
        }

        let mut words = vec!["edurouter"];
        words.extend(trimmed.split_whitespace());
        match Cli::try_parse_from(words) {
            Ok(cli) => {
                if let Some(command) = cli.command {
                    run_command(orchestrator, command);
                }
            }
            Err(e) => println!("{e}"),
        }
        print_prompt();
    }
}

fn print_prompt() {
    print!("edurouter> ");
    let _ = io::stdout().flush();
}

/// `log none|debug|info|error` — adjusts the logger's max level at runtime.
/// Not a `clap` subcommand: it controls the logger rather than the router,
/// so it is handled before the line ever reaches `Cli::try_parse_from`.
fn handle_log_command(trimmed: &str) {
    let level = trimmed.strip_prefix("log").unwrap_or("").trim();
    let filter = match level {
        "none" => log::LevelFilter::Off,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "error" => log::LevelFilter::Error,
        other => {
            println!("unknown log level {other:?}, expected one of: none, debug, info, error");
            return;
        }
    };
    edurouter_core::set_log_level(filter);
}

fn run_command(orchestrator: &Orchestrator, command: Command) {
    match command {
        Command::Add { interface } => match parse_interface_config(&interface) {
            Ok(parsed) => match orchestrator.add_interface(parsed.name.clone(), parsed.simulated_network) {
                Ok(()) => println!("added interface {}", parsed.name),
                Err(e) => println!("error: {e}"),
            },
            Err(e) => println!("error: {e}"),
        },
        Command::Route { action } => handle_route_command(orchestrator, action),
        Command::List => {
            println!("interfaces:");
            for iface in orchestrator.list_interfaces() {
                println!("  {} {}", iface.name, iface.simulated_network());
            }
            println!("routes:");
            for (i, route) in orchestrator.list_routes().iter().enumerate() {
                println!("  [{i}] {route:?}");
            }
        }
        Command::Ping { target, count } => {
            println!("pinging {target} ({count} requests)");
            let _ = orchestrator.ping(target, count);
        }
        Command::Version => println!("edurouter {}", edurouter_core::VERSION),
    }
}

fn handle_route_command(orchestrator: &Orchestrator, action: RouteCommand) {
    let route = match action {
        RouteCommand::LinkLocal { network, out_interface } => {
            let network = match ipnetwork::Ipv4Network::from_str(&network) {
                Ok(net) => net,
                Err(e) => {
                    println!("error: invalid network {network:?}: {e}");
                    return;
                }
            };
            Route::link_local(network, out_interface)
        }
        RouteCommand::Static { network, out_interface, next_hop } => {
            let network = match ipnetwork::Ipv4Network::from_str(&network) {
                Ok(net) => net,
                Err(e) => {
                    println!("error: invalid network {network:?}: {e}");
                    return;
                }
            };
            Route::static_route(network, out_interface, next_hop)
        }
    };

    match orchestrator.add_route(route) {
        Ok(()) => println!("route added"),
        Err(e) => println!("error: {e}"),
    }
}

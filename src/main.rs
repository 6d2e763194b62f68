use clap::{Arg, ArgMatches, Command};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use tracing::error;
use tracing_subscriber::EnvFilter;

use arithsock::config::SOCKET_PATH_ENV;
use arithsock::{
    call_once, run_session, Client, ClientConfig, Operation, Request, Server, ServerConfig,
    DEFAULT_SOCKET_PATH,
};

fn socket_arg() -> Arg {
    Arg::new("socket")
        .short('s')
        .long("socket")
        .help("Path to the UNIX socket")
        .env(SOCKET_PATH_ENV)
        .default_value(DEFAULT_SOCKET_PATH)
        .value_parser(clap::value_parser!(PathBuf))
}

// Runs the server until Ctrl-C or SIGTERM, then removes the socket file.
fn run_server(config: ServerConfig) -> arithsock::Result<()> {
    let server = Server::bind(config)?;
    let handle = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || handle.shutdown()) {
        error!("failed to install signal handler: {}", e);
    }
    server.run();
    Ok(())
}

fn run_client(config: ClientConfig) -> arithsock::Result<()> {
    let client = Client::connect(&config.socket_path)?;
    println!("Connected to server.");
    let stdin = io::stdin();
    run_session(client, stdin.lock(), &mut io::stdout())
}

// Sends a single request. Returns whether the server accepted it.
fn run_call(config: ClientConfig, sub_m: &ArgMatches) -> arithsock::Result<bool> {
    let keyword = sub_m
        .get_one::<String>("operation")
        .map(String::as_str)
        .unwrap_or_default();
    let op = Operation::from_keyword(keyword);
    let operand1 = sub_m.get_one::<i32>("operand1").copied().unwrap_or_default();
    let operand2 = sub_m.get_one::<i32>("operand2").copied().unwrap_or_default();

    let response = call_once(&config, &Request::new(op, operand1, operand2))?;

    if response.valid {
        println!("{}", response.result);
    } else {
        eprintln!("Error from server (invalid op or divide-by-zero)");
    }
    Ok(response.valid)
}

fn socket_path(sub_m: &ArgMatches) -> PathBuf {
    sub_m
        .get_one::<PathBuf>("socket")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
}

// Main entry point of the application.
// Usage:
//   server [-s PATH] [--idle-timeout SECS] - Serves arithmetic requests on a UNIX socket.
//   client [-s PATH]                       - Interactive prompt against a running server.
//   call <OP> <A> <B> [-s PATH]            - Sends one request and prints the result.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let matches = Command::new("arithsock")
        .about("Arithmetic server and client over UNIX sockets")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("server")
                .about("Serve arithmetic requests on a UNIX socket")
                .arg(socket_arg())
                .arg(
                    Arg::new("idle_timeout")
                        .long("idle-timeout")
                        .help("Close connections idle for this many seconds (0 = never)")
                        .default_value("0")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("client")
                .about("Connect to a server and prompt for operations")
                .arg(socket_arg()),
        )
        .subcommand(
            Command::new("call")
                .about("Send a single request and print the result")
                .arg(
                    Arg::new("operation")
                        .help("One of add, sub, mul, div")
                        .num_args(1)
                        .required(true),
                )
                .arg(
                    Arg::new("operand1")
                        .num_args(1)
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(i32)),
                )
                .arg(
                    Arg::new("operand2")
                        .num_args(1)
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(i32)),
                )
                .arg(socket_arg()),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("server", sub_m)) => {
            let idle_timeout = sub_m.get_one::<u64>("idle_timeout").copied().unwrap_or(0);
            let config = ServerConfig::new(socket_path(sub_m))
                .with_idle_timeout(Duration::from_secs(idle_timeout));
            run_server(config).map(|_| true)
        }
        Some(("client", sub_m)) => run_client(ClientConfig::new(socket_path(sub_m))).map(|_| true),
        Some(("call", sub_m)) => run_call(ClientConfig::new(socket_path(sub_m)), sub_m),
        _ => {
            eprintln!("Invalid command");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

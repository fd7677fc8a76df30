//! One-shot client operations and a toy register-map server, wiring the
//! protocol core to POSIX serial/TCP transports.
//!
//! Grounded on the teacher's `main.rs` `Cli`/`CommonArgs` pattern, with
//! subcommands replacing the teacher's single relay-mode invocation.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use tinymodbus::config::CliConfig;
use tinymodbus::posix::{serial::SerialTransport, tcp::TcpTransport};
use tinymodbus::server::{ServerCallbacks, ANY_ADDRESS};
use tinymodbus::{CallbackStatus, Encapsulation, ExceptionCode, ModbusClient, ModbusServer, Request};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to the config file.
    #[arg(short, long, default_value = "tinymodbus.yaml")]
    config: PathBuf,

    /// Dump default config and exit.
    #[arg(long = "dump-default-config")]
    dump_default: bool,

    /// Use TCP instead of the serial line.
    #[arg(long)]
    tcp: bool,

    /// Device/unit address.
    #[arg(short, long, default_value_t = 1)]
    address: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Read holding registers starting at `address`.
    ReadHoldingRegisters { start_address: u16, quantity: u16 },
    /// Write a single holding register.
    WriteSingleRegister { address: u16, value: u16 },
    /// Serve a toy in-memory register bank.
    Serve,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.common.dump_default {
        println!("{}", serde_yaml::to_string(&CliConfig::default())?);
        return Ok(());
    }

    let config = if cli.common.config.exists() {
        CliConfig::from_file(cli.common.config.clone())?
    } else {
        CliConfig::new().unwrap_or_default()
    };

    tinymodbus::logging::setup_logging(&config.logging).map_err(|e| format!("logging init failed: {e}"))?;

    match cli.command {
        Command::ReadHoldingRegisters { start_address, quantity } => {
            run_client(&cli.common, &config, |client| {
                let resp = client.call(&Request::ReadHoldingRegisters { start_address, quantity })?;
                info!(?resp, "read holding registers");
                println!("{resp:?}");
                Ok(())
            })
        }
        Command::WriteSingleRegister { address, value } => run_client(&cli.common, &config, |client| {
            let resp = client.call(&Request::WriteSingleRegister { address, value })?;
            info!(?resp, "write single register");
            println!("{resp:?}");
            Ok(())
        }),
        Command::Serve => run_server(&cli.common, &config),
    }
}

fn run_client(
    common: &CommonArgs,
    config: &CliConfig,
    f: impl FnOnce(&mut dyn ClientLike) -> Result<(), Box<dyn std::error::Error>>,
) -> Result<(), Box<dyn std::error::Error>> {
    if common.tcp {
        let transport = TcpTransport::connect(&config.tcp)?;
        let mut client = ModbusClient::new(transport, Encapsulation::Tcp, common.address);
        f(&mut client)
    } else {
        let transport = SerialTransport::open(&config.serial)?;
        let mut client = ModbusClient::new(transport, Encapsulation::Rtu, common.address);
        f(&mut client)
    }
}

/// Lets `run_client`'s closure stay agnostic to which [`tinymodbus::Transport`]
/// backs the handle.
trait ClientLike {
    fn call(&mut self, request: &Request) -> Result<tinymodbus::Response<'_>, tinymodbus::Error>;
}

impl<T: tinymodbus::Transport> ClientLike for ModbusClient<T> {
    fn call(&mut self, request: &Request) -> Result<tinymodbus::Response<'_>, tinymodbus::Error> {
        ModbusClient::call(self, request)
    }
}

struct RegisterBank {
    holding: [u16; 128],
}

impl ServerCallbacks for RegisterBank {
    fn on_read_holding_register(&mut self, _unit: u8, address: u16) -> (u16, CallbackStatus) {
        match self.holding.get(address as usize) {
            Some(&v) => (v, CallbackStatus::Ok),
            None => (0, CallbackStatus::Exception(ExceptionCode::IllegalDataAddress)),
        }
    }

    fn on_write_holding_register(&mut self, _unit: u8, address: u16, value: u16) -> CallbackStatus {
        match self.holding.get_mut(address as usize) {
            Some(slot) => {
                *slot = value;
                CallbackStatus::Ok
            }
            None => CallbackStatus::Exception(ExceptionCode::IllegalDataAddress),
        }
    }
}

fn run_server(common: &CommonArgs, config: &CliConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bank = RegisterBank { holding: [0; 128] };

    if common.tcp {
        let listener = TcpTransport::bind(&config.tcp)?;
        info!(addr = %config.tcp.bind_addr, port = config.tcp.bind_port, "listening");
        let (stream, peer) = listener.accept()?;
        info!(%peer, "accepted connection");
        let transport = TcpTransport::from_stream(stream, config.tcp.read_timeout)?;
        let mut server = ModbusServer::new(transport, Encapsulation::Tcp);
        server.set_callback(ANY_ADDRESS, Some(Box::new(bank)))?;
        loop {
            server.poll_once()?;
        }
    } else {
        let transport = SerialTransport::open(&config.serial)?;
        let mut server = ModbusServer::new(transport, Encapsulation::Rtu);
        server.set_callback(ANY_ADDRESS, Some(Box::new(bank)))?;
        loop {
            server.poll_once()?;
        }
    }
}

use plotter_queue::device::{DeviceConfig, SimConfig, StreamConfig};
use plotter_queue::{Command, Dispatcher, LogLine, Program, QueueConfig, QueueEvent};
use std::path::PathBuf;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable naming a TCP device bridge, e.g. "127.0.0.1:5000"
const DEVICE_ENV: &str = "PLOTTER_DEVICE";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let device_config = match std::env::var(DEVICE_ENV) {
        Ok(address) => DeviceConfig::Tcp {
            address,
            stream: StreamConfig::default(),
        },
        Err(_) => DeviceConfig::Simulated(SimConfig {
            // Fixed seed keeps simulated runs repeatable
            seed: Some(2),
            ..Default::default()
        }),
    };

    let program = load_program(std::env::args().nth(1).map(PathBuf::from));
    for line in program.describe_lines() {
        println!("{}", LogLine::plain(line).render());
    }

    let (channel, inbound) = device_config.connect().await?;
    info!("Device channel ready: {}", channel.name());

    let (dispatcher, mut events) = Dispatcher::new(channel, inbound, QueueConfig::default());
    dispatcher.enqueue_all(program.into_commands());

    while let Some(event) = events.recv().await {
        println!("{}", LogLine::from(&event).render());
        if event == QueueEvent::QueueEmpty {
            break;
        }
    }

    Ok(())
}

/// Load the program named on the command line, else the saved default
/// program, else a short demonstration program
fn load_program(path: Option<PathBuf>) -> Program {
    let explicit = path.is_some();
    let path = path.or_else(Program::default_path);

    if let Some(path) = path {
        if explicit || path.exists() {
            match Program::load(&path) {
                Ok(program) => {
                    info!("Loaded {} commands from {}", program.len(), path.display());
                    return program;
                }
                Err(e) => error!("Failed to load {}: {}", path.display(), e),
            }
        }
    }

    warn!("No program loaded, running the demonstration program");
    demo_program()
}

fn demo_program() -> Program {
    let mut program = Program::new();
    program.push(Command::home());
    program.push(Command::Xy {
        x: Some(3),
        y: Some(7),
    });
    program.push(Command::delay(50));
    program.push(Command::Xy { x: None, y: Some(4) });
    program
}

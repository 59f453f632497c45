//! Console front end for the cncflow driver.
//!
//! Connects to a TinyG/g2core board over serial or TCP, prints every
//! broadcast event, and optionally streams a G-code file:
//!
//! ```text
//! cncflow --port /dev/ttyUSB0 [--baud 115200] [--send part.nc]
//! cncflow --tcp 192.168.1.50:23 [--send part.nc]
//! ```

use std::time::Duration;

use serde_json::json;

use cncflow_core::{init_logging, DriverConfig};
use cncflow_tinyg::transport::{ConnectionParams, SerialTransport, TcpTransport, Transport};
use cncflow_tinyg::TinygController;

struct Options {
    port: Option<String>,
    baud: u32,
    tcp: Option<String>,
    send: Option<String>,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        port: None,
        baud: 115_200,
        tcp: None,
        send: None,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or(format!("{} needs a value", name));
        match arg.as_str() {
            "--port" => options.port = Some(value("--port")?),
            "--baud" => {
                options.baud = value("--baud")?
                    .parse()
                    .map_err(|e| format!("bad baud rate: {}", e))?;
            }
            "--tcp" => options.tcp = Some(value("--tcp")?),
            "--send" => options.send = Some(value("--send")?),
            other => return Err(format!("unknown argument: {}", other)),
        }
    }

    if options.port.is_none() && options.tcp.is_none() {
        return Err("one of --port or --tcp is required".to_string());
    }
    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("cncflow: {}", message);
            eprintln!("usage: cncflow --port <path> [--baud <rate>] [--send <file>]");
            eprintln!("       cncflow --tcp <host:port> [--send <file>]");
            std::process::exit(2);
        }
    };

    let transport: Box<dyn Transport> = match (&options.port, &options.tcp) {
        (Some(port), _) => Box::new(SerialTransport::new(ConnectionParams {
            port: port.clone(),
            baud_rate: options.baud,
            ..Default::default()
        })),
        (None, Some(addr)) => Box::new(TcpTransport::new(addr.clone(), Duration::from_millis(50))),
        (None, None) => unreachable!(),
    };

    let mut controller = TinygController::new(transport, DriverConfig::default());

    // Print every broadcast the driver emits.
    let mut events = controller.bus().receiver();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{}] {}", event.wire_name(), event.description());
        }
    });

    controller.connect().await?;
    tracing::info!("Controller ready");

    if let Some(path) = &options.send {
        let content = std::fs::read_to_string(path)?;
        controller.command("sender:load", &json!([path, content]))?;
        controller.command("sender:start", &json!([]))?;
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    controller.disconnect().await?;
    Ok(())
}

use bluer::{Adapter, Address, Device, Session};
use clap::{Parser, Subcommand};
use futures::FutureExt;
use jdy25m::bluez::{self, BluezCharacteristic, ScannedDevice};
use jdy25m::transport::hex_dump;
use jdy25m::{
    BaudRate, DeviceConfiguration, DeviceIdentity, DeviceReport, DiscoveryConfig, Jdy25m,
    Jdy25mError, PasswordType, Result, Role, SessionConfig,
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt::Display;
use std::time::Duration;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "jdy25m")]
#[command(about = "Query and configure JDY-25M BLE modules")]
struct Args {
    /// Bluetooth MAC address of the module (format: AA:BB:CC:DD:EE:FF)
    #[arg(long, env = "JDY25M_ADDRESS")]
    address: Option<String>,

    /// Seconds to wait for each response (0 waits indefinitely)
    #[arg(long, default_value = "1")]
    timeout: f64,

    /// Seconds to scan for a module when none is known yet
    #[arg(long, default_value = "10")]
    scan_timeout: u64,

    /// Seconds to wait for GATT services to be resolved
    #[arg(long, default_value = "30")]
    resolve_timeout: u64,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List modules advertising the JDY service
    Scan,
    /// Print identity and configuration (default)
    Info,
    /// Print version, name, iBeacon UUID and mesh addresses
    Identity,
    /// Print the configuration registers
    Config,
    /// Set the broadcast name
    SetName { name: String },
    /// Set the role (name or ordinal, e.g. mesh-network or 5)
    SetRole { role: Role },
    /// Set the serial baud rate (e.g. 115200)
    SetBaud { rate: BaudRate },
    /// Set the password type (none, connection, connection-and-binding)
    SetPasswordType { password_type: PasswordType },
    /// Set the TX power level
    SetTxPower { power: u8 },
    /// Reboot the module
    Reset,
    /// Restore the factory configuration
    Restore,
    /// Ask the module to drop the connection
    Disconnect,
}

impl Args {
    fn session_config(&self) -> Result<SessionConfig> {
        let timeout = Duration::try_from_secs_f64(self.timeout).map_err(|_| {
            Jdy25mError::InvalidArgument(format!("invalid timeout '{}'", self.timeout))
        })?;
        Ok(SessionConfig {
            default_timeout: (!timeout.is_zero()).then_some(timeout),
        })
    }

    fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            scan_timeout: Some(Duration::from_secs(self.scan_timeout)),
            resolve_timeout: Duration::from_secs(self.resolve_timeout),
            ..DiscoveryConfig::default()
        }
    }
}

fn print_result<T: Serialize + Display>(value: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

/// Modules BlueZ already knows, or the first one a scan turns up
async fn known_or_discovered(adapter: &Adapter, discovery: &DiscoveryConfig) -> Result<Vec<Device>> {
    let devices = bluez::available_devices(adapter, discovery.service_uuid).await?;
    if !devices.is_empty() {
        return Ok(devices);
    }
    info!("Waiting for device...");
    bluez::discover(adapter, discovery).await
}

async fn scan(adapter: &Adapter, discovery: &DiscoveryConfig, json: bool) -> Result<()> {
    let devices = known_or_discovered(adapter, discovery).await?;
    let mut found = Vec::with_capacity(devices.len());
    for device in &devices {
        found.push(ScannedDevice::describe(device).await?);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        for device in &found {
            let name = device.name.as_deref().unwrap_or("unnamed");
            match &device.manufacturer_data {
                Some(data) => println!("{} {} [{}]", device.address, name, hex_dump(data, 16)),
                None => println!("{} {}", device.address, name),
            }
        }
    }
    Ok(())
}

async fn find_device(
    adapter: &Adapter,
    address: Option<&str>,
    discovery: &DiscoveryConfig,
) -> Result<Device> {
    if let Some(address) = address {
        let address: Address = address.parse().map_err(|_| {
            Jdy25mError::InvalidArgument(format!("Invalid MAC address: {}", address))
        })?;
        return Ok(adapter.device(address)?);
    }

    known_or_discovered(adapter, discovery)
        .await?
        .into_iter()
        .next()
        .ok_or(Jdy25mError::NoDevicesFound)
}

async fn execute(dev: &mut Jdy25m<BluezCharacteristic>, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Info => print_result(&DeviceReport::read(dev).await?, json),
        Command::Identity => print_result(&DeviceIdentity::read(dev).await?, json),
        Command::Config => print_result(&DeviceConfiguration::read(dev).await?, json),
        Command::SetName { name } => dev.write_broadcast_name(&name).await,
        Command::SetRole { role } => dev.write_role(role).await,
        Command::SetBaud { rate } => dev.write_baud_rate(rate).await,
        Command::SetPasswordType { password_type } => dev.write_password_type(password_type).await,
        Command::SetTxPower { power } => dev.write_tx_power(power).await,
        Command::Reset => dev.reset_device().await,
        Command::Restore => dev.restore_device_config().await,
        Command::Disconnect => dev.disconnect_device().await,
        Command::Scan => Err(Jdy25mError::InvalidArgument(
            "scan does not run in a session".to_string(),
        )),
    }
}

async fn run_session(
    device: &Device,
    discovery: &DiscoveryConfig,
    config: SessionConfig,
    command: Command,
    json: bool,
) -> Result<()> {
    let characteristic = bluez::resolve_characteristic(device, discovery).await?;
    Jdy25m::scoped(characteristic, config, move |dev| {
        async move {
            // Ctrl-C cancels the pending read; the session is still closed
            let interrupter = dev.interrupter();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted");
                    interrupter.interrupt();
                }
            });
            let result = execute(dev, command, json).await;
            ctrl_c.abort();
            result
        }
        .boxed_local()
    })
    .await
}

async fn run(args: Args) -> Result<()> {
    let config = args.session_config()?;
    let discovery = args.discovery_config();
    let command = args.command.clone().unwrap_or(Command::Info);

    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    debug!("Using adapter: {}", adapter.name());
    bluez::ensure_powered(&adapter).await?;

    if let Command::Scan = command {
        return scan(&adapter, &discovery, args.json).await;
    }

    let device = find_device(&adapter, args.address.as_deref(), &discovery).await?;
    info!(
        "Device found: {} {}",
        device.address(),
        device.name().await?.as_deref().unwrap_or("unnamed")
    );

    bluez::connect(&device).await?;
    let result = run_session(&device, &discovery, config, command, args.json).await;
    if let Err(e) = device.disconnect().await {
        warn!("Failed to disconnect from {}: {}", device.address(), e);
    }
    result
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("{}", e);
        return Err(Box::new(e));
    }
    Ok(())
}

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use partylight_ota_lib::ota::{select_peer, total_chunks};
use partylight_ota_lib::{
    logging, tlog, BleTransport, FirmwareImage, OtaConfig, OtaController, OtaError, Transport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Update Partylight / Blindomator firmware over Bluetooth LE
#[derive(Parser)]
#[command(name = "partylight-ota", version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Firmware binary to upload
    #[arg(value_name = "FIRMWARE")]
    firmware: Option<PathBuf>,

    /// Case-insensitive fragment of the device name to update
    #[arg(value_name = "DEVICE_NAME")]
    device_name: Option<String>,

    /// Peer id to connect to directly, skipping the scan
    #[arg(long, value_name = "ID")]
    address: Option<String>,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Also write the log to a timestamped file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List nearby Bluetooth devices
    Scan {
        /// Scan window in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Show the OTA status of a device without changing it
    Status {
        /// Case-insensitive fragment of the device name
        device_name: Option<String>,

        /// Peer id to connect to directly, skipping the scan
        #[arg(long, value_name = "ID")]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(dir) = &cli.log_dir {
        if let Err(e) = logging::init_file_logging(dir) {
            tlog!("[cli] {e}");
        }
    }

    let code = match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("\n✗ Error: {e}");
            ExitCode::from(e.exit_code())
        }
    };

    logging::stop_file_logging();
    code
}

async fn run(cli: Cli) -> Result<(), OtaError> {
    let config = OtaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Scan { timeout_ms }) => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.scan_timeout());
            scan_devices(timeout).await
        }
        Some(Commands::Status {
            device_name,
            address,
        }) => show_status(&config, device_name.as_deref(), address).await,
        None => {
            let Some(firmware) = cli.firmware else {
                let _ = Cli::command().print_help();
                println!();
                return Err(OtaError::usage("missing required <FIRMWARE> argument"));
            };
            update_device(&config, firmware, cli.device_name.as_deref(), cli.address).await
        }
    }
}

async fn scan_devices(timeout: Duration) -> Result<(), OtaError> {
    let transport = BleTransport::new().await?;
    let peers = transport
        .scan(timeout)
        .await
        .map_err(|e| OtaError::AdapterUnavailable(e.to_string()))?;

    let named: Vec<_> = peers.iter().filter(|p| p.name.is_some()).collect();
    if named.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    for peer in &named {
        match peer.rssi {
            Some(rssi) => println!("  {}  {} dBm", peer, rssi),
            None => println!("  {}", peer),
        }
    }
    println!("\nFound {} named device(s)", named.len());
    Ok(())
}

async fn show_status(
    config: &OtaConfig,
    device_name: Option<&str>,
    address: Option<String>,
) -> Result<(), OtaError> {
    let transport = BleTransport::new().await?;
    let peer_id = resolve_peer(&transport, config, device_name, address).await?;
    let status = OtaController::new(&transport, config)
        .query_status(&peer_id)
        .await?;
    println!("OTA status of {}: {}", peer_id, status);
    Ok(())
}

async fn update_device(
    config: &OtaConfig,
    firmware: PathBuf,
    device_name: Option<&str>,
    address: Option<String>,
) -> Result<(), OtaError> {
    let image = FirmwareImage::load(&firmware)?;
    if image.is_empty() {
        return Err(OtaError::EmptyFirmware { path: firmware });
    }

    println!("Firmware: {}", firmware.display());
    println!(
        "   {} bytes in {} chunks, sha256 {}",
        image.size(),
        total_chunks(image.size(), config.chunk_size),
        image.sha256_hex()
    );

    let transport = BleTransport::new().await?;
    let peer_id = resolve_peer(&transport, config, device_name, address).await?;

    let pb = ProgressBar::new(image.size() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("   {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let result = OtaController::new(&transport, config)
        .perform_update(&peer_id, &image, |progress| {
            pb.set_position(progress.bytes_sent as u64);
        })
        .await;
    pb.finish_and_clear();

    let outcome = result?;
    println!("\n✓ OTA update completed successfully! ({})", outcome.describe());
    Ok(())
}

/// Use `address` when given, otherwise scan and select by name.
async fn resolve_peer(
    transport: &BleTransport,
    config: &OtaConfig,
    device_name: Option<&str>,
    address: Option<String>,
) -> Result<String, OtaError> {
    if let Some(address) = address {
        tlog!("[cli] Using address {address}, skipping scan");
        return Ok(address);
    }
    let peer = select_peer(
        transport,
        device_name,
        config.scan_timeout(),
        &config.device_markers,
    )
    .await?;
    println!("Found device: {}", peer);
    Ok(peer.id)
}

//! `wiresync` CLI shell (§A.5): a thin binary over the library, standing in
//! for the external application that would own a real serial cable and a
//! GUI. TCP takes the place of the null-modem/USB-serial byte stream —
//! swapping in a real `ByteLink` impl later touches nothing in the protocol
//! core.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use wiresync::byte_link::TcpByteLink;
use wiresync::config::Config;
use wiresync::controller::PeerController;
use wiresync::events::EventBus;
use wiresync::logging::{info, warn};
use wiresync::manifest;

#[derive(Parser)]
#[command(name = "wiresync", about = "Peer-to-peer directory sync over a single byte stream")]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	/// Path to a JSON config file; missing paths fall back to defaults (§A.3).
	#[arg(long, global = true)]
	config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
	/// Accept one incoming connection and run as a receiver-capable peer.
	Listen {
		#[arg(long)]
		addr: String,
		#[arg(long, default_value = ".")]
		root: PathBuf,
	},
	/// Connect to a listening peer and, if elected sender, start a sync round.
	Connect {
		#[arg(long)]
		addr: String,
		#[arg(long)]
		root: PathBuf,
	},
	/// Run the Manifest Engine once over `dir` and print its JSON to stdout.
	Manifest { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	wiresync::logging::init_tracing();
	let cli = Cli::parse();
	let config = load_config(&cli.config).await?;

	match cli.command {
		Commands::Listen { addr, root } => run_peer(TcpListener::bind(&addr).await?.accept().await?.0, root, config).await,
		Commands::Connect { addr, root } => run_peer(TcpStream::connect(&addr).await?, root, config).await,
		Commands::Manifest { dir } => run_manifest(dir, config).await,
	}
}

async fn load_config(path: &Option<PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
	match path {
		Some(p) => Ok(Config::load(p).await?),
		None => Ok(Config::default()),
	}
}

/// Run the Peer Controller to completion: the reader loop and heartbeat
/// supervisor alongside a watcher that kicks off a sync round as soon as
/// role negotiation elects us sender (§4.5, §4.6).
async fn run_peer(stream: TcpStream, root: PathBuf, config: Config) -> Result<(), Box<dyn std::error::Error>> {
	let link = TcpByteLink::new(stream);
	let controller = PeerController::new(Box::new(link), root, config, EventBus::null());
	let ctx = controller.context();

	tokio::join!(controller.run(), async {
		loop {
			if ctx.state.role_negotiated() || !ctx.state.running() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(50)).await;
		}
		if ctx.state.is_sender() {
			info!("elected sender; starting sync session");
			if let Err(e) = controller.start_sync().await {
				warn!(error = %e, "sync session did not complete");
			}
		}
	});

	Ok(())
}

async fn run_manifest(dir: PathBuf, config: Config) -> Result<(), Box<dyn std::error::Error>> {
	let prior = match &config.manifest_cache_path {
		Some(path) => manifest::Manifest::load(path).await.ok(),
		None => None,
	};
	let snapshot = manifest::generate_manifest(&dir, &config, prior.as_ref()).await?;
	println!("{}", snapshot.to_json()?);
	Ok(())
}

// vim: ts=4

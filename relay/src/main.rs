mod network;
mod participants;
mod sequencer;

use clap::Parser;
use log::info;
use network::Relay;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the relay socket to
    #[arg(short = 'b', long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Maximum number of concurrent participants
    #[arg(short = 'm', long, default_value = "16")]
    max_participants: usize,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting relay...");
    info!("Binding to: {}", args.bind);
    info!("Max participants: {}", args.max_participants);

    let mut relay = Relay::new(&args.bind, args.max_participants).await?;
    relay.run().await?;

    Ok(())
}

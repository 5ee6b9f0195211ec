use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = hdh_relay::cli::Cli::parse();
    if let Err(e) = hdh_relay::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

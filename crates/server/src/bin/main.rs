use sluice_server::SluiceServer;

#[derive(clap::Parser)]
#[command(name = "sluice-server", about = "Federated SQL query gateway", version)]
struct Args {
    #[arg(long, default_value = "config/sluice.yaml")]
    config: String,

    #[arg(long, default_value = "config/sources.yaml")]
    sources: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    SluiceServer::new()
        .with_app_config(&args.config)
        .with_sources(&args.sources)
        .run()
        .await
}

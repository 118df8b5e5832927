use cpr_daemon::{config::DaemonConfig, daemon::run_daemon};
use dotenvy::dotenv;
use log::info;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = DaemonConfig::from_env_or_default();

    info!("🚀️ Starting the payment reconciliation daemon");
    match run_daemon(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

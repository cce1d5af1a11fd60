//! Fleet entry point
//!
//! Loads settings, builds the shared fleet context, and runs the
//! supervisor until Ctrl+C.

use taixiu::{init_tracing, Fleet};
use taixiu_fleet::bin_common::settings_path_from_env;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let path = settings_path_from_env();
    info!("loading settings from {}", path.display());

    let fleet = Fleet::new(taixiu::SettingsSource::new(path))?;
    fleet.run().await;

    Ok(())
}

//! Probe one account's SOCKS5 endpoint against the game host
//!
//! Usage: `test_proxy <username>`

use std::time::Duration;

use linekeeper::core::net::{self, ProxyAddr};
use taixiu::{init_tracing, CmsClient, Settings};
use taixiu_fleet::bin_common::{parse_args, settings_path_from_env};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = parse_args();
    let Some(username) = args.first() else {
        anyhow::bail!("usage: test_proxy <username>");
    };

    let settings = Settings::load(settings_path_from_env())?;
    let cms = CmsClient::new(&settings.cms_base_url);

    let account = cms.user(username).await?;
    let Some(raw) = account.proxy.as_deref() else {
        anyhow::bail!("[{username}] has no proxy configured");
    };
    let proxy = ProxyAddr::parse(raw)?;

    println!(
        "probing {}:{} -> {}:{}",
        proxy.host, proxy.port, settings.game_host, settings.game_port
    );
    match net::probe(
        &proxy,
        (settings.game_host.as_str(), settings.game_port),
        Duration::from_secs(10),
    )
    .await
    {
        Ok(()) => println!("proxy OK"),
        Err(e) => println!("proxy FAILED: {e}"),
    }

    Ok(())
}

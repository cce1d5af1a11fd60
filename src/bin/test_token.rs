//! Validate one account's session token against the live game endpoint
//!
//! Usage: `test_token <username>`
//!
//! The result is mirrored into the account's CMS status, the same way
//! the session lifecycle records it.

use std::time::Duration;

use linekeeper::core::net::ProxyAddr;
use taixiu::credentials;
use taixiu::{init_tracing, CmsClient, Settings};
use taixiu_fleet::bin_common::{parse_args, settings_path_from_env};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = parse_args();
    let Some(username) = args.first() else {
        anyhow::bail!("usage: test_token <username>");
    };

    let settings = Settings::load(settings_path_from_env())?;
    let cms = CmsClient::new(&settings.cms_base_url);

    let account = cms.user(username).await?;
    let Some(token) = account.jwt.as_deref() else {
        anyhow::bail!("[{username}] has no session token in the CMS");
    };
    let proxy = match account.proxy.as_deref() {
        Some(raw) => Some(ProxyAddr::parse(raw)?),
        None => None,
    };

    println!("checking token for [{username}]...");
    let ok = credentials::validate_and_mark(
        &cms,
        &settings.game_ws_url,
        &settings.namespace,
        username,
        token,
        proxy.as_ref(),
        Duration::from_secs(10),
    )
    .await;

    if ok {
        println!("token OK for [{username}]");
    } else {
        println!("token REJECTED for [{username}]");
    }

    Ok(())
}

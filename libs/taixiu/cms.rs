//! CMS account-store client
//!
//! The CMS owns account rows (credentials, proxy endpoint, balance,
//! status), the per-user stake totals, the bet history and the win/loss
//! streaks. Everything here is plain HTTP with short timeouts; callers
//! are expected to log failures and carry on: the CMS is advisory and
//! must never stall the game loop.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CmsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

pub type Result<T> = std::result::Result<T, CmsError>;

/// Account lifecycle status as stored in the CMS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Playing,
    ProxyFailed,
    TokenFailed,
    OutOfMoney,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Playing => "playing",
            AccountStatus::ProxyFailed => "proxy_failed",
            AccountStatus::TokenFailed => "token_failed",
            AccountStatus::OutOfMoney => "out_of_money",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One account row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Long-lived gateway credential used to mint session tokens
    #[serde(default)]
    pub access_token: Option<String>,
    /// Current game session token
    #[serde(default)]
    pub jwt: Option<String>,
    /// `host:port:user:pass`
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub balance: i64,
    #[serde(default)]
    pub status: Option<String>,
}

impl UserRecord {
    pub fn has_status(&self, status: AccountStatus) -> bool {
        self.status.as_deref() == Some(status.as_str())
    }
}

/// Cumulative stake totals for one user
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct BetTotals {
    #[serde(default)]
    pub total_day: i64,
    #[serde(default)]
    pub total_week: i64,
    #[serde(default)]
    pub total_month: i64,
}

#[derive(Debug, Deserialize)]
struct BetTotalsRow {
    username: String,
    #[serde(flatten)]
    totals: BetTotals,
}

#[derive(Debug, Deserialize)]
struct BetTotalsPage {
    #[serde(default)]
    data: Vec<BetTotalsRow>,
}

/// One bet-history row
#[derive(Debug, Clone, Serialize)]
pub struct BetRecord {
    pub username: String,
    pub game: String,
    pub amount: i64,
    pub door: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prize: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dices: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakOutcome {
    Won,
    Lost,
}

impl StreakOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreakOutcome::Won => "won",
            StreakOutcome::Lost => "lost",
        }
    }
}

pub struct CmsClient {
    http: reqwest::Client,
    base: String,
}

impl CmsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    fn ok(status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(CmsError::Status(status))
        }
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>> {
        let resp = self.http.get(self.url("/api/users")).send().await?;
        Self::ok(resp.status())?;
        Ok(resp.json().await?)
    }

    pub async fn user(&self, username: &str) -> Result<UserRecord> {
        let resp = self
            .http
            .get(self.url(&format!("/api/users/{username}")))
            .send()
            .await?;
        Self::ok(resp.status())?;
        Ok(resp.json().await?)
    }

    /// Accounts the supervisor should keep connected
    pub async fn active_accounts(&self) -> Result<Vec<UserRecord>> {
        let users = self.users().await?;
        Ok(users
            .into_iter()
            .filter(|u| u.has_status(AccountStatus::Playing))
            .collect())
    }

    async fn put_user_fields(&self, username: &str, fields: serde_json::Value) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&format!("/api/users/{username}")))
            .json(&fields)
            .send()
            .await?;
        Self::ok(resp.status())
    }

    pub async fn update_balance(&self, username: &str, balance: i64) -> Result<()> {
        self.put_user_fields(username, json!({ "balance": balance }))
            .await
    }

    pub async fn update_status(&self, username: &str, status: AccountStatus) -> Result<()> {
        debug!("[{username}] status -> {status}");
        self.put_user_fields(username, json!({ "status": status.as_str() }))
            .await
    }

    pub async fn update_token(&self, username: &str, jwt: &str) -> Result<()> {
        self.put_user_fields(username, json!({ "jwt": jwt })).await
    }

    /// Daily/weekly/monthly stake totals, keyed by username
    pub async fn bet_totals(&self) -> Result<HashMap<String, BetTotals>> {
        let resp = self
            .http
            .get(self.url("/api/bet-totals"))
            .query(&[("page", "1"), ("limit", "10000")])
            .send()
            .await?;
        Self::ok(resp.status())?;
        let page: BetTotalsPage = resp.json().await?;
        Ok(page
            .data
            .into_iter()
            .map(|row| (row.username, row.totals))
            .collect())
    }

    pub async fn record_bet(&self, record: &BetRecord) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/api/bet-history"))
            .json(record)
            .send()
            .await?;
        Self::ok(resp.status())
    }

    pub async fn record_streak(&self, username: &str, outcome: StreakOutcome) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/streaks/update"))
            .json(&json!({ "username": username, "result": outcome.as_str() }))
            .send()
            .await?;
        Self::ok(resp.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_record_tolerates_sparse_rows() {
        let row: UserRecord =
            serde_json::from_str(r#"{"username":"alice"}"#).unwrap();
        assert_eq!(row.username, "alice");
        assert_eq!(row.balance, 0);
        assert!(row.jwt.is_none());
        assert!(!row.has_status(AccountStatus::Playing));
    }

    #[test]
    fn bet_totals_page_parses_flattened_rows() {
        let page: BetTotalsPage = serde_json::from_str(
            r#"{"data":[{"username":"bob","total_day":5000,"total_week":20000,"total_month":90000}]}"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].totals.total_week, 20_000);
    }

    #[test]
    fn bet_record_omits_absent_result_fields() {
        let record = BetRecord {
            username: "carol".into(),
            game: "taixiu".into(),
            amount: 50_000,
            door: "TAI".into(),
            status: "success".into(),
            balance: Some(1_000_000),
            prize: None,
            dices: None,
        };
        let v = serde_json::to_value(&record).unwrap();
        assert!(v.get("prize").is_none());
        assert!(v.get("dices").is_none());
        assert_eq!(v["balance"], 1_000_000);
    }
}

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use serde_json::Value;

use crate::constants::{BASE_CURRENCY, SUPPORTED_CURRENCIES};
use crate::tracker::config::RatesConfig;

#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("rate source returned http {0}")]
    Status(u16),
    #[error("malformed rate data: {0}")]
    Malformed(String),
    #[error("rate cache file: {0}")]
    Persistence(#[from] std::io::Error),
}

pub fn build_client() -> Result<reqwest::Client, RateError> {
    let client = reqwest::Client::builder()
        .user_agent("subtrack/0.1")
        // Avoid hanging forever on broken TCP handshakes.
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

/// GETs the latest-rates endpoint and returns "base units per 1 foreign unit" factors.
pub async fn fetch_rates(
    client: &reqwest::Client,
    cfg: &RatesConfig,
) -> Result<BTreeMap<String, f64>, RateError> {
    let symbols = SUPPORTED_CURRENCIES.join(",");
    let mut query = vec![("base", BASE_CURRENCY.to_string()), ("symbols", symbols)];
    if let Some(key) = cfg.access_key.as_deref().filter(|k| !k.trim().is_empty()) {
        query.push(("access_key", key.trim().to_string()));
    }

    let resp = client
        .get(cfg.endpoint.trim())
        .query(&query)
        .timeout(Duration::from_secs(cfg.request_timeout_seconds.max(1)))
        .send()
        .await?;
    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(RateError::Status(status));
    }
    let body = resp
        .json::<Value>()
        .await
        .map_err(|e| RateError::Malformed(e.to_string()))?;
    invert_rates(&body)
}

/// The source quotes "foreign units per 1 base unit"; invert every supported code.
pub fn invert_rates(body: &Value) -> Result<BTreeMap<String, f64>, RateError> {
    let Some(remote) = body.get("rates").and_then(Value::as_object) else {
        return Err(RateError::Malformed("missing rates".to_string()));
    };

    let mut out = BTreeMap::new();
    out.insert(BASE_CURRENCY.to_string(), 1.0);
    for code in SUPPORTED_CURRENCIES {
        if code == BASE_CURRENCY {
            continue;
        }
        let quoted = remote.get(code).and_then(as_f64);
        match quoted {
            Some(v) if v.is_finite() && v > 0.0 => {
                out.insert(code.to_string(), 1.0 / v);
            }
            _ => return Err(RateError::Malformed(format!("no usable rate for {code}"))),
        }
    }
    Ok(out)
}

/// Reads a persisted rate table and its last-modified time.
pub fn read_cache_file(path: &Path) -> Result<(BTreeMap<String, f64>, u64), RateError> {
    let modified = std::fs::metadata(path)?.modified()?;
    let modified_unix_ms = modified
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let txt = std::fs::read_to_string(path)?;
    let raw: BTreeMap<String, Value> =
        serde_json::from_str(&txt).map_err(|e| RateError::Malformed(e.to_string()))?;

    let mut rates = BTreeMap::new();
    for code in SUPPORTED_CURRENCIES {
        let factor = raw.get(code).and_then(as_f64);
        match factor {
            Some(v) if v.is_finite() && v >= 0.0 => {
                rates.insert(code.to_string(), v);
            }
            _ => {
                return Err(RateError::Malformed(format!(
                    "cache file has no usable rate for {code}"
                )))
            }
        }
    }
    rates.insert(BASE_CURRENCY.to_string(), 1.0);
    Ok((rates, modified_unix_ms))
}

pub fn write_cache_file(path: &Path, rates: &BTreeMap<String, f64>) -> Result<(), RateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let txt = serde_json::to_string_pretty(rates).map_err(|e| RateError::Malformed(e.to_string()))?;
    std::fs::write(path, txt)?;
    Ok(())
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

pub const BASE_CURRENCY: &str = "TWD";
pub const SUPPORTED_CURRENCIES: [&str; 6] = ["TWD", "USD", "JPY", "HKD", "EUR", "CNY"];
pub const DEFAULT_RATES_ENDPOINT: &str = "https://api.exchangerate.host/latest";
pub const DEFAULT_RATES_CACHE_FILE: &str = "exchange_rates.cache.json";
pub const DEFAULT_RATES_TTL_SECONDS: u64 = 24 * 60 * 60;
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 4100;
pub const DATA_DIR_ENV: &str = "SUBTRACK_DATA_DIR";
pub const PASSWORD_ENV: &str = "SUBTRACK_PASSWORD";

pub fn is_supported_currency(code: &str) -> bool {
    SUPPORTED_CURRENCIES.contains(&code)
}

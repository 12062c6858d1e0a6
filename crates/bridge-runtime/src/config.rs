//! Configuration from the process environment.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use xs3_bridge::BridgeConfig;

/// Load configuration from the process environment
pub fn load_config() -> BridgeConfig {
    from_lookup(|key| std::env::var(key).ok())
}

/// Build configuration from an arbitrary variable lookup.
///
/// Unset variables keep their defaults, as do numbers that fail to parse.
pub fn from_lookup<F>(lookup: F) -> BridgeConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BridgeConfig::default();
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(host) = var("MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Some(port) = parsed(&var, "MQTT_PORT") {
        config.mqtt.port = port;
    }
    if let Some(client_id) = var("MQTT_CLIENT_ID") {
        config.mqtt.client_id = client_id;
    }
    config.mqtt.cert_path = var("MQTT_CERT_PATH").map(Into::into);
    config.mqtt.key_path = var("MQTT_KEY_PATH").map(Into::into);
    config.mqtt.ca_path = var("MQTT_CA_PATH").map(Into::into);
    if let Some(secs) = parsed(&var, "MQTT_KEEP_ALIVE_SECS") {
        config.mqtt.keep_alive = Duration::from_secs(secs);
    }
    if let Some(ms) = millis(&var, "MQTT_RECONNECT_MS") {
        config.mqtt.reconnect_period = ms;
    }

    if let Some(username) = var("XS3_USERNAME") {
        config.credentials.username = username;
    }
    if let Some(password) = var("XS3_PASSWORD") {
        config.credentials.password = password;
    }
    if let Some(station) = var("CODING_STATION_UUID") {
        config.station_id = station;
    }

    let timeouts = &mut config.timeouts;
    for (key, slot) in [
        ("XS3_LOGIN_FALLBACK_MS", &mut timeouts.login_fallback),
        ("XS3_QUERY_TIMEOUT_MS", &mut timeouts.query),
        ("XS3_ACK_TIMEOUT_BEGIN_MS", &mut timeouts.ack_begin),
        ("XS3_ACK_TIMEOUT_END_MS", &mut timeouts.ack_end),
        ("XS3_ACK_TIMEOUT_MS", &mut timeouts.ack_default),
        ("XS3_MSS_CONFIRM_TIMEOUT_MS", &mut timeouts.mss_confirm),
        ("XS3_REVOKE_TIMEOUT_MS", &mut timeouts.revoke),
    ] {
        if let Some(ms) = millis(&var, key) {
            *slot = ms;
        }
    }

    if let Some(tries) = parsed(&var, "XS3_CONFIRM_TRIES") {
        config.confirm.tries = tries;
    }
    if let Some(ms) = millis(&var, "XS3_CONFIRM_SLEEP_MS") {
        config.confirm.interval = ms;
    }

    config
}

fn parsed<T, V>(var: &V, key: &str) -> Option<T>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable override, keeping default");
            None
        }
    }
}

fn millis<V>(var: &V, key: &str) -> Option<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    parsed::<u64, V>(var, key).map(Duration::from_millis)
}

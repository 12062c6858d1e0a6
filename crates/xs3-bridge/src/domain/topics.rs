//! MQTT topic layout of the Xesar 3 API.
//!
//! These strings are the wire contract with the backend and the coding
//! station readers; they must stay bit-exact.

/// Login command (primary `{name,password}` and fallback `{username,password}`)
pub const LOGIN_COMMAND: &str = "xs3/1/cmd/Login";
/// Login confirmations; the `+` segment is the session owner id
pub const LOGGED_IN_PATTERN: &str = "xs3/1/+/LoggedIn";
/// Query requests
pub const QUERY_REQUEST: &str = "xs3/1/q";
/// Query replies, scoped per session owner
pub const QUERY_REPLY_PATTERN: &str = "xs3/1/+/q";
/// Error replies, scoped per session owner
pub const ERROR_REPLY_PATTERN: &str = "xs3/1/+/err";
/// Command events (acknowledgements and confirmations)
pub const SYSTEM_EVENTS_PATTERN: &str = "xs3/1/ces/#";
pub const SYSTEM_EVENTS_PREFIX: &str = "xs3/1/ces/";
/// Mobile-service command events
pub const MSS_EVENTS_PATTERN: &str = "xs3/1/mss/ces/#";
pub const MSS_UPDATE_CONFIRMED: &str = "xs3/1/mss/ces/SmartphoneUpdateConfirmed";
pub const MSS_REVOKE_CONFIRMED: &str = "xs3/1/mss/ces/SmartphoneRevokeConfirmed";
/// Emitted whenever an identification medium is modified
pub const MEDIUM_CHANGED: &str = "xs3/1/ces/MediumChanged";
pub const MEDIUM_REVOKED: &str = "xs3/1/ces/MediumRevoked";
/// Reader events from every coding station
pub const READER_PATTERN: &str = "readers/1/+";

const READER_PREFIX: &str = "readers/1/";

/// Topic a named command is published on
pub fn command(name: &str) -> String {
    format!("xs3/1/cmd/{name}")
}

/// Topic a mobile-service command is published on
pub fn mss_command(name: &str) -> String {
    format!("xs3/1/mss/cmd/{name}")
}

pub fn query_reply(user_id: &str) -> String {
    format!("xs3/1/{user_id}/q")
}

pub fn error_reply(user_id: &str) -> String {
    format!("xs3/1/{user_id}/err")
}

pub fn is_error_reply(topic: &str) -> bool {
    single_segment(topic, "xs3/1/", "/err").is_some()
}

/// Session owner id from a login confirmation topic
pub fn logged_in_owner(topic: &str) -> Option<&str> {
    single_segment(topic, "xs3/1/", "/LoggedIn")
}

/// Station id from a reader event topic
pub fn reader_station(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(READER_PREFIX)
        .filter(|station| !station.is_empty() && !station.contains('/'))
}

/// Every subscription the bridge needs for its lifetime.
///
/// Re-issued after each (re)connect since the broker session is clean.
pub fn long_lived_subscriptions() -> [&'static str; 6] {
    [
        LOGGED_IN_PATTERN,
        QUERY_REPLY_PATTERN,
        ERROR_REPLY_PATTERN,
        SYSTEM_EVENTS_PATTERN,
        MSS_EVENTS_PATTERN,
        READER_PATTERN,
    ]
}

fn single_segment<'a>(topic: &'a str, prefix: &str, suffix: &str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)?
        .strip_suffix(suffix)
        .filter(|segment| !segment.is_empty() && !segment.contains('/'))
}

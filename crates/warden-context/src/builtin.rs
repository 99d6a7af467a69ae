//! Built-in context definitions.
//!
//! | Key | Type | Match rule |
//! |-----|------|-----------|
//! | `world` | string | exact equality |
//! | `server-tag` | string | exact equality; active values are the configured tags |
//! | `proxy` | bool | equality |
//! | `ip` | CIDR | stored network contains active address |
//! | `before-time` | time | active instant is before the stored cutoff |
//! | `after-time` | time | active instant is after the stored cutoff |
//!
//! Time comparison is at second precision; sub-second differences never
//! change a match result.

use crate::cidr::CidrBlock;
use crate::definition::{ContextDefinition, ContextEnvironment};
use crate::value::{ContextValue, ParsedValue};
use chrono::{DateTime, Utc};

/// Key of the built-in world context.
pub const KEY_WORLD: &str = "world";
/// Key of the built-in server-tag context.
pub const KEY_SERVER_TAG: &str = "server-tag";
/// Key of the built-in proxy-connection context.
pub const KEY_PROXY: &str = "proxy";
/// Key of the built-in IP-range context.
pub const KEY_IP: &str = "ip";
/// Key of the built-in before-time context.
pub const KEY_BEFORE_TIME: &str = "before-time";
/// Key of the built-in after-time context.
pub const KEY_AFTER_TIME: &str = "after-time";

/// Exact-match string context under a caller-chosen key.
///
/// Active values come from the environment's static values for the key.
#[derive(Debug, Clone)]
pub struct StringContext {
    key: String,
}

impl StringContext {
    /// Creates a string context owning `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The built-in `world` context.
    #[must_use]
    pub fn world() -> Self {
        Self::new(KEY_WORLD)
    }
}

impl ContextDefinition for StringContext {
    fn key(&self) -> &str {
        &self.key
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        Some(ParsedValue::Str(raw.to_string()))
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        match (stored, active) {
            (ParsedValue::Str(s), ParsedValue::Str(a)) => s == a,
            _ => false,
        }
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        for raw in env.static_values(&self.key) {
            sink(ContextValue::resolved(
                &self.key,
                raw.clone(),
                ParsedValue::Str(raw.clone()),
            ));
        }
    }
}

/// The `server-tag` context: exact string match, with every configured
/// tag active at once.
#[derive(Debug, Clone, Default)]
pub struct ServerTagContext;

impl ContextDefinition for ServerTagContext {
    fn key(&self) -> &str {
        KEY_SERVER_TAG
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        Some(ParsedValue::Str(raw.to_string()))
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        match (stored, active) {
            (ParsedValue::Str(s), ParsedValue::Str(a)) => s == a,
            _ => false,
        }
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        for tag in env.server_tags() {
            sink(ContextValue::resolved(
                KEY_SERVER_TAG,
                tag.clone(),
                ParsedValue::Str(tag.clone()),
            ));
        }
    }
}

/// Boolean context. Accepts `true`/`false` (any case) and `1`/`0`.
#[derive(Debug, Clone)]
pub struct BoolContext {
    key: String,
}

impl BoolContext {
    /// Creates a boolean context owning `key`.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// The built-in `proxy` context.
    #[must_use]
    pub fn proxy() -> Self {
        Self::new(KEY_PROXY)
    }
}

impl ContextDefinition for BoolContext {
    fn key(&self) -> &str {
        &self.key
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Some(ParsedValue::Bool(true)),
            "false" | "0" => Some(ParsedValue::Bool(false)),
            _ => None,
        }
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        match (stored, active) {
            (ParsedValue::Bool(s), ParsedValue::Bool(a)) => s == a,
            _ => false,
        }
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        if self.key == KEY_PROXY {
            let value = env.proxy();
            sink(ContextValue::resolved(
                &self.key,
                if value { "true" } else { "false" },
                ParsedValue::Bool(value),
            ));
        }
        for raw in env.static_values(&self.key) {
            if let Some(parsed) = self.parse(raw) {
                sink(ContextValue::resolved(&self.key, raw.clone(), parsed));
            }
        }
    }
}

/// The `ip` context: a stored CIDR block matches when it contains the
/// active address. Containment is one-directional — an active network
/// wider than the stored one does not match.
#[derive(Debug, Clone, Default)]
pub struct CidrContext;

impl ContextDefinition for CidrContext {
    fn key(&self) -> &str {
        KEY_IP
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        raw.parse::<CidrBlock>().ok().map(ParsedValue::Cidr)
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        match (stored, active) {
            (ParsedValue::Cidr(net), ParsedValue::Cidr(candidate)) => {
                net.contains(candidate.addr())
            }
            _ => false,
        }
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        if let Some(addr) = env.remote_address() {
            let block = CidrBlock::host(addr);
            sink(ContextValue::resolved(
                KEY_IP,
                block.to_string(),
                ParsedValue::Cidr(block),
            ));
        }
    }
}

/// Direction of a time-cutoff comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeDirection {
    Before,
    After,
}

/// Time-cutoff context, `before-time` flavor: matches while the active
/// instant is strictly before the stored cutoff.
#[derive(Debug, Clone, Default)]
pub struct BeforeTimeContext;

/// Time-cutoff context, `after-time` flavor: matches once the active
/// instant is strictly after the stored cutoff.
#[derive(Debug, Clone, Default)]
pub struct AfterTimeContext;

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Bare integer: unix epoch seconds.
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn time_matches(direction: TimeDirection, stored: &ParsedValue, active: &ParsedValue) -> bool {
    let (ParsedValue::Time(cutoff), ParsedValue::Time(instant)) = (stored, active) else {
        return false;
    };
    // Second precision: sub-second components never decide a match.
    let cutoff = cutoff.timestamp();
    let instant = instant.timestamp();
    match direction {
        TimeDirection::Before => instant < cutoff,
        TimeDirection::After => instant > cutoff,
    }
}

fn emit_now(key: &'static str, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
    let now = env.now();
    sink(ContextValue::resolved(
        key,
        now.to_rfc3339(),
        ParsedValue::Time(now),
    ));
}

impl ContextDefinition for BeforeTimeContext {
    fn key(&self) -> &str {
        KEY_BEFORE_TIME
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        parse_time(raw).map(ParsedValue::Time)
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        time_matches(TimeDirection::Before, stored, active)
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        emit_now(KEY_BEFORE_TIME, env, sink);
    }
}

impl ContextDefinition for AfterTimeContext {
    fn key(&self) -> &str {
        KEY_AFTER_TIME
    }

    fn parse(&self, raw: &str) -> Option<ParsedValue> {
        parse_time(raw).map(ParsedValue::Time)
    }

    fn matches(&self, stored: &ParsedValue, active: &ParsedValue) -> bool {
        time_matches(TimeDirection::After, stored, active)
    }

    fn current_values(&self, env: &ContextEnvironment, sink: &mut dyn FnMut(ContextValue)) {
        emit_now(KEY_AFTER_TIME, env, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn collect(def: &dyn ContextDefinition, env: &ContextEnvironment) -> Vec<ContextValue> {
        let mut out = Vec::new();
        def.current_values(env, &mut |v| out.push(v));
        out
    }

    #[test]
    fn string_context_exact_match() {
        let world = StringContext::world();
        let nether = world.parse("nether").unwrap();
        let end = world.parse("end").unwrap();
        assert!(world.matches(&nether, &nether));
        assert!(!world.matches(&nether, &end));
    }

    #[test]
    fn string_context_reads_static_values() {
        let env = ContextEnvironment::new().with_static_values(KEY_WORLD, ["nether"]);
        let values = collect(&StringContext::world(), &env);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].raw(), "nether");
    }

    #[test]
    fn server_tag_contributes_all_configured_tags() {
        let env = ContextEnvironment::new().with_server_tags(["good", "fast"]);
        let values = collect(&ServerTagContext, &env);
        let raws: Vec<_> = values.iter().map(|v| v.raw()).collect();
        assert_eq!(raws, vec!["good", "fast"]);
    }

    #[test]
    fn bool_context_parsing() {
        let proxy = BoolContext::proxy();
        assert_eq!(proxy.parse("true"), Some(ParsedValue::Bool(true)));
        assert_eq!(proxy.parse("TRUE"), Some(ParsedValue::Bool(true)));
        assert_eq!(proxy.parse("0"), Some(ParsedValue::Bool(false)));
        assert_eq!(proxy.parse("maybe"), None);
    }

    #[test]
    fn proxy_reports_environment_flag() {
        let env = ContextEnvironment::new().with_proxy(true);
        let values = collect(&BoolContext::proxy(), &env);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].raw(), "true");
    }

    #[test]
    fn cidr_containment_is_one_directional() {
        let ip = CidrContext;
        let network = ip.parse("10.0.0.0/8").unwrap();
        let host = ip.parse("10.1.2.3").unwrap();
        assert!(ip.matches(&network, &host));
        // The reverse direction must not match: a stored host does not
        // contain an active network wider than itself.
        assert!(!ip.matches(&host, &network));
    }

    #[test]
    fn cidr_malformed_input_is_soft() {
        assert!(CidrContext.parse("999.0.0.0/8").is_none());
        assert!(CidrContext.parse("").is_none());
    }

    #[test]
    fn cidr_current_value_is_remote_address() {
        let env = ContextEnvironment::new().with_remote_address("10.1.2.3".parse().unwrap());
        let values = collect(&CidrContext, &env);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].raw(), "10.1.2.3/32");
    }

    #[test]
    fn before_time_bounds_the_active_instant() {
        let before = BeforeTimeContext;
        let cutoff = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let stored = ParsedValue::Time(cutoff);

        let earlier = ParsedValue::Time(cutoff - Duration::hours(1));
        let later = ParsedValue::Time(cutoff + Duration::hours(1));
        assert!(before.matches(&stored, &earlier));
        assert!(!before.matches(&stored, &later));
        // Exactly at the cutoff is not before it.
        assert!(!before.matches(&stored, &ParsedValue::Time(cutoff)));
    }

    #[test]
    fn after_time_is_the_mirror() {
        let after = AfterTimeContext;
        let cutoff = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let stored = ParsedValue::Time(cutoff);

        assert!(after.matches(&stored, &ParsedValue::Time(cutoff + Duration::seconds(1))));
        assert!(!after.matches(&stored, &ParsedValue::Time(cutoff - Duration::seconds(1))));
        assert!(!after.matches(&stored, &ParsedValue::Time(cutoff)));
    }

    #[test]
    fn time_comparison_is_second_precision() {
        let before = BeforeTimeContext;
        let cutoff = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
        let stored = ParsedValue::Time(cutoff);

        // Same second, different sub-second: treated as equal, not before.
        let same_second = cutoff + Duration::milliseconds(500);
        assert!(!before.matches(&stored, &ParsedValue::Time(same_second)));
    }

    #[test]
    fn time_parsing_accepts_rfc3339_and_epoch() {
        let def = BeforeTimeContext;
        assert!(def.parse("2026-06-01T00:00:00Z").is_some());
        assert!(def.parse("1750000000").is_some());
        assert!(def.parse("next tuesday").is_none());
    }

    #[test]
    fn time_context_contributes_now() {
        let instant = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let env = ContextEnvironment::new().with_clock(instant);
        let values = collect(&BeforeTimeContext, &env);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].parsed(), Some(&ParsedValue::Time(instant)));
    }
}

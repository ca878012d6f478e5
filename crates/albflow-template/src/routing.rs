//! Listener routing: conditions, entries and first-match evaluation

use crate::error::{Result, StackError};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// ALB path patterns are limited to 128 characters
const MAX_PATTERN_LEN: usize = 128;

/// A listener rule condition. Matches when any of its values matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "values", rename_all = "kebab-case")]
pub enum RouteCondition {
    /// Request path, `*` and `?` wildcards, case-sensitive
    PathPattern(Vec<String>),
    /// Host header, `*` and `?` wildcards, case-insensitive
    HostHeader(Vec<String>),
    /// Exact HTTP method
    HttpRequestMethod(Vec<String>),
    /// Client address in CIDR notation
    SourceIp(Vec<String>),
}

impl RouteCondition {
    pub fn path(pattern: impl Into<String>) -> Self {
        RouteCondition::PathPattern(vec![pattern.into()])
    }

    pub fn host(pattern: impl Into<String>) -> Self {
        RouteCondition::HostHeader(vec![pattern.into()])
    }

    pub fn method(method: impl Into<String>) -> Self {
        RouteCondition::HttpRequestMethod(vec![method.into()])
    }

    pub fn source_ip(cidr: impl Into<String>) -> Self {
        RouteCondition::SourceIp(vec![cidr.into()])
    }

    /// The CloudFormation `Field` name
    pub fn field(&self) -> &'static str {
        match self {
            RouteCondition::PathPattern(_) => "path-pattern",
            RouteCondition::HostHeader(_) => "host-header",
            RouteCondition::HttpRequestMethod(_) => "http-request-method",
            RouteCondition::SourceIp(_) => "source-ip",
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            RouteCondition::PathPattern(v)
            | RouteCondition::HostHeader(v)
            | RouteCondition::HttpRequestMethod(v)
            | RouteCondition::SourceIp(v) => v,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.values().is_empty() {
            return Err(StackError::InvalidConfig(format!(
                "{} condition requires at least one value",
                self.field()
            )));
        }
        for value in self.values() {
            match self {
                RouteCondition::PathPattern(_) | RouteCondition::HostHeader(_) => {
                    if value.len() > MAX_PATTERN_LEN {
                        return Err(StackError::InvalidConfig(format!(
                            "{} pattern exceeds {} characters: {}",
                            self.field(),
                            MAX_PATTERN_LEN,
                            value
                        )));
                    }
                    Pattern::new(value).map_err(|e| {
                        StackError::InvalidConfig(format!("invalid pattern '{}': {}", value, e))
                    })?;
                }
                RouteCondition::HttpRequestMethod(_) => {
                    if value.is_empty() {
                        return Err(StackError::InvalidConfig(
                            "empty http-request-method value".to_string(),
                        ));
                    }
                }
                RouteCondition::SourceIp(_) => {
                    parse_cidr(value)?;
                }
            }
        }
        Ok(())
    }

    /// Evaluate against a request
    pub fn matches(&self, request: &RouteRequest) -> bool {
        match self {
            RouteCondition::PathPattern(patterns) => patterns
                .iter()
                .any(|p| wildcard_match(p, &request.path, true)),
            RouteCondition::HostHeader(patterns) => match &request.host {
                Some(host) => patterns.iter().any(|p| wildcard_match(p, host, false)),
                None => false,
            },
            RouteCondition::HttpRequestMethod(methods) => {
                methods.iter().any(|m| m == &request.method)
            }
            RouteCondition::SourceIp(cidrs) => match request.source_ip {
                Some(ip) => cidrs.iter().any(|c| cidr_contains(c, ip)),
                None => false,
            },
        }
    }

    /// Render as an `AWS::ElasticLoadBalancingV2::ListenerRule` RuleCondition
    pub fn to_rule_condition(&self) -> serde_json::Value {
        let config_key = match self {
            RouteCondition::PathPattern(_) => "PathPatternConfig",
            RouteCondition::HostHeader(_) => "HostHeaderConfig",
            RouteCondition::HttpRequestMethod(_) => "HttpRequestMethodConfig",
            RouteCondition::SourceIp(_) => "SourceIpConfig",
        };
        let mut condition = serde_json::Map::new();
        condition.insert("Field".to_string(), serde_json::json!(self.field()));
        condition.insert(
            config_key.to_string(),
            serde_json::json!({ "Values": self.values() }),
        );
        serde_json::Value::Object(condition)
    }
}

impl std::fmt::Display for RouteCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.field(), self.values().join(","))
    }
}

fn wildcard_match(pattern: &str, input: &str, case_sensitive: bool) -> bool {
    let options = MatchOptions {
        case_sensitive,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    Pattern::new(pattern)
        .map(|p| p.matches_with(input, options))
        .unwrap_or(false)
}

fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8)> {
    let invalid = || StackError::InvalidConfig(format!("invalid CIDR block: {}", cidr));

    let (addr, bits) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    let bits: u8 = bits.parse().map_err(|_| invalid())?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if bits > max {
        return Err(invalid());
    }
    Ok((addr, bits))
}

fn cidr_contains(cidr: &str, ip: IpAddr) -> bool {
    let Ok((network, bits)) = parse_cidr(cidr) else {
        return false;
    };
    match (network, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) => {
            let mask = u32::MAX.checked_shl(32 - bits as u32).unwrap_or(0);
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) => {
            let mask = u128::MAX.checked_shl(128 - bits as u32).unwrap_or(0);
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}

/// The parts of an incoming request a listener rule can inspect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub path: String,
    pub method: String,
    pub host: Option<String>,
    pub source_ip: Option<IpAddr>,
}

impl RouteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: "GET".to_string(),
            host: None,
            source_ip: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_source_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }
}

/// One routing decision: a condition (or the default) and its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    /// Evaluation priority, 1 is evaluated first
    pub priority: u32,

    /// `None` for the default route
    pub condition: Option<RouteCondition>,

    /// Compute target name
    pub target: String,
}

impl RoutingEntry {
    pub fn is_default(&self) -> bool {
        self.condition.is_none()
    }
}

/// Routing entries ordered by priority
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    entries: Vec<RoutingEntry>,
}

impl RouteTable {
    pub fn new(mut entries: Vec<RoutingEntry>) -> Self {
        // Stable: equal priorities keep their given order
        entries.sort_by_key(|e| e.priority);
        Self { entries }
    }

    pub fn entries(&self) -> &[RoutingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose condition matches; the default matches anything
    pub fn evaluate(&self, request: &RouteRequest) -> Option<&RoutingEntry> {
        self.entries.iter().find(|entry| match &entry.condition {
            Some(condition) => condition.matches(request),
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_pattern() {
        let cond = RouteCondition::path("/newhello*");
        assert!(cond.matches(&RouteRequest::get("/newhello")));
        assert!(cond.matches(&RouteRequest::get("/newhello/world")));
        assert!(!cond.matches(&RouteRequest::get("/hello")));
        assert!(!cond.matches(&RouteRequest::get("/NEWHELLO")));

        let single = RouteCondition::path("/v?/items");
        assert!(single.matches(&RouteRequest::get("/v1/items")));
        assert!(!single.matches(&RouteRequest::get("/v10/items")));
    }

    #[test]
    fn test_host_header_is_case_insensitive() {
        let cond = RouteCondition::host("*.example.com");
        assert!(cond.matches(&RouteRequest::get("/").with_host("API.Example.com")));
        assert!(!cond.matches(&RouteRequest::get("/").with_host("example.org")));
        assert!(!cond.matches(&RouteRequest::get("/")));
    }

    #[test]
    fn test_method_and_source_ip() {
        let post = RouteCondition::method("POST");
        assert!(post.matches(&RouteRequest::get("/").with_method("POST")));
        assert!(!post.matches(&RouteRequest::get("/")));

        let cidr = RouteCondition::source_ip("10.0.0.0/8");
        let inside = RouteRequest::get("/").with_source_ip("10.1.2.3".parse().unwrap());
        let outside = RouteRequest::get("/").with_source_ip("192.168.0.1".parse().unwrap());
        assert!(cidr.matches(&inside));
        assert!(!cidr.matches(&outside));

        let any = RouteCondition::source_ip("0.0.0.0/0");
        assert!(any.matches(&outside));
    }

    #[test]
    fn test_validation() {
        assert!(RouteCondition::path("/ok*").validate().is_ok());
        assert!(RouteCondition::PathPattern(vec![]).validate().is_err());
        assert!(RouteCondition::path("x".repeat(129)).validate().is_err());
        assert!(RouteCondition::source_ip("10.0.0.0").validate().is_err());
        assert!(RouteCondition::source_ip("10.0.0.0/33").validate().is_err());
        assert!(RouteCondition::source_ip("::1/128").validate().is_ok());
    }

    #[test]
    fn test_rule_condition_rendering() {
        assert_eq!(
            RouteCondition::path("/newhello*").to_rule_condition(),
            json!({
                "Field": "path-pattern",
                "PathPatternConfig": { "Values": ["/newhello*"] }
            })
        );
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new(vec![
            RoutingEntry {
                priority: 3,
                condition: None,
                target: "D".into(),
            },
            RoutingEntry {
                priority: 1,
                condition: Some(RouteCondition::path("/api/*")),
                target: "A".into(),
            },
            RoutingEntry {
                priority: 2,
                condition: Some(RouteCondition::path("/api/v1/*")),
                target: "B".into(),
            },
        ]);

        // Matches both A and B; A was registered first
        let hit = table.evaluate(&RouteRequest::get("/api/v1/users")).unwrap();
        assert_eq!(hit.target, "A");

        let fallback = table.evaluate(&RouteRequest::get("/other")).unwrap();
        assert_eq!(fallback.target, "D");
        assert!(fallback.is_default());
    }
}

use regex::Regex;
use std::sync::OnceLock;

static DOMAIN_PATTERN: OnceLock<Regex> = OnceLock::new();
static IPV4_PATTERN: OnceLock<Regex> = OnceLock::new();

fn domain_pattern() -> &'static Regex {
    DOMAIN_PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("domain pattern is valid")
    })
}

fn ipv4_pattern() -> &'static Regex {
    IPV4_PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").expect("ipv4 pattern is valid")
    })
}

/// Syntactic check for a probe target: a dotted domain name whose last label
/// has at least two letters, or a dotted-quad IPv4 literal.
///
/// Octets are not range-checked (`999.1.1.1` passes). A leading `-` is
/// rejected so the target can never be read as an option by the probe
/// program.
pub fn is_valid_target(target: &str) -> bool {
    if target.starts_with('-') {
        return false;
    }
    domain_pattern().is_match(target) || ipv4_pattern().is_match(target)
}

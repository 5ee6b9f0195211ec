//! Private vs. public reachability of a target domain.
//!
//! A domain is private when it can only be reached from inside the hub's
//! network and must therefore go through the gateway. Classification is a
//! pure string/IP check on the hostname; nothing is resolved.

use std::net::Ipv4Addr;

use url::{Host, Url};

use crate::config::model::ClassifierConfig;

#[derive(Debug, Clone)]
pub struct DomainClassifier {
    suffixes: Vec<String>,
    infixes: Vec<String>,
}

impl DomainClassifier {
    #[must_use]
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            suffixes: config
                .private_suffixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            infixes: config
                .private_infixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Returns `true` when `domain` needs the gateway transport.
    ///
    /// Accepts bare hostnames, `host:port` and full URLs. Anything that does
    /// not yield a hostname is treated as public.
    #[must_use]
    pub fn is_private(&self, domain: &str) -> bool {
        let Some(host) = parse_host(domain) else {
            return false;
        };

        match host {
            Host::Ipv4(ip) => is_private_v4(ip),
            Host::Ipv6(ip) => ip.is_loopback() || ip.to_ipv4_mapped().is_some_and(is_private_v4),
            Host::Domain(name) => {
                let name = name.trim_end_matches('.');
                name == "localhost"
                    || name.ends_with(".localhost")
                    || self.suffixes.iter().any(|suffix| {
                        name.ends_with(suffix.as_str()) || name == suffix.trim_start_matches('.')
                    })
                    || self.infixes.iter().any(|infix| name.contains(infix.as_str()))
            }
        }
    }
}

impl Default for DomainClassifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback()
}

fn parse_host(domain: &str) -> Option<Host<String>> {
    let domain = domain.trim();
    if domain.is_empty() {
        return None;
    }

    // "host:port" would otherwise parse as a URL with scheme "host"
    let parsed = if domain.contains("://") {
        Url::parse(domain)
    } else {
        Url::parse(&format!("https://{domain}"))
    };

    parsed.ok()?.host().map(|h| h.to_owned())
}

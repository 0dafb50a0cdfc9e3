//! SSRF filter for outbound requests and redirects.
//!
//! Hosts are checked as written in the URL; literal addresses are classified
//! without DNS resolution. Redirect targets must additionally belong to a
//! small set of trusted hosts.

use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use url::Host;
use url::Url;

/// Hostnames that are always refused.
const BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata",
    "metadata.google.internal",
    "metadata.azure.com",
    "instance-data",
    "instance-data.ec2.internal",
];

/// Redirects may only land on these hosts or their subdomains.
pub const TRUSTED_REDIRECT_HOSTS: &[&str] =
    &["github.com", "githubusercontent.com", "packages.typst.org"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    UnparseableUrl,
    MissingHost,
    BlockedHostname(String),
    NonPublicAddress(IpAddr),
    UntrustedRedirect(String),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::UnparseableUrl => write!(f, "unparseable URL"),
            BlockReason::MissingHost => write!(f, "URL has no host"),
            BlockReason::BlockedHostname(host) => write!(f, "blocked hostname {host}"),
            BlockReason::NonPublicAddress(ip) => write!(f, "non-public address {ip}"),
            BlockReason::UntrustedRedirect(host) => {
                write!(f, "redirect to untrusted host {host}")
            }
        }
    }
}

/// Classifies `url` for a first-hand outbound request.
pub fn check_outbound(url: &str) -> Result<(), BlockReason> {
    let parsed = Url::parse(url).map_err(|_| BlockReason::UnparseableUrl)?;
    check_host(&parsed).map(|_| ())
}

/// Classifies `url` as a redirect target.
pub fn check_redirect(url: &str) -> Result<(), BlockReason> {
    let parsed = Url::parse(url).map_err(|_| BlockReason::UnparseableUrl)?;
    let host = check_host(&parsed)?;
    let Some(domain) = host else {
        return Err(BlockReason::UntrustedRedirect(
            parsed.host_str().unwrap_or_default().to_string(),
        ));
    };
    if TRUSTED_REDIRECT_HOSTS
        .iter()
        .any(|trusted| domain == *trusted || domain.ends_with(&format!(".{trusted}")))
    {
        Ok(())
    } else {
        Err(BlockReason::UntrustedRedirect(domain))
    }
}

pub fn is_outbound_safe(url: &str) -> bool {
    check_outbound(url)
        .inspect_err(|reason| tracing::warn!("blocked outbound request to {url}: {reason}"))
        .is_ok()
}

pub fn is_redirect_safe(url: &str) -> bool {
    check_redirect(url)
        .inspect_err(|reason| tracing::warn!("blocked redirect to {url}: {reason}"))
        .is_ok()
}

/// Returns the normalized domain name, or `None` for a (public) literal
/// address.
fn check_host(url: &Url) -> Result<Option<String>, BlockReason> {
    match url.host() {
        None => Err(BlockReason::MissingHost),
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)).map(|()| None),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)).map(|()| None),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain.is_empty() {
                return Err(BlockReason::MissingHost);
            }
            if BLOCKED_HOSTNAMES.contains(&domain.as_str()) || domain.ends_with(".localhost") {
                return Err(BlockReason::BlockedHostname(domain));
            }
            Ok(Some(domain))
        }
    }
}

fn check_ip(ip: IpAddr) -> Result<(), BlockReason> {
    let blocked = match ip {
        IpAddr::V4(v4) => is_non_public_v4(v4),
        IpAddr::V6(v6) => is_non_public_v6(v6),
    };
    if blocked {
        Err(BlockReason::NonPublicAddress(ip))
    } else {
        Ok(())
    }
}

fn is_non_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        // 169.254.0.0/16 covers the cloud metadata endpoint.
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && ip.octets()[2] == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b == 18 || b == 19))
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_non_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_non_public_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn public_registry_urls_are_safe() {
        for url in [
            "https://api.github.com/repos/typst/packages/contents/packages/preview/cetz",
            "https://raw.githubusercontent.com/typst/packages/main/README.md",
            "https://packages.typst.org/preview/index.json",
            "https://93.184.216.34/",
        ] {
            assert!(is_outbound_safe(url), "{url}");
        }
    }

    #[test]
    fn metadata_endpoint_is_blocked() {
        assert!(!is_outbound_safe("http://169.254.169.254/latest/meta-data/"));
        assert_eq!(
            check_outbound("http://169.254.169.254/"),
            Err(BlockReason::NonPublicAddress("169.254.169.254".parse().expect("ip")))
        );
        assert!(!is_outbound_safe("http://metadata.google.internal/computeMetadata/v1/"));
    }

    #[test]
    fn private_loopback_and_reserved_addresses_are_blocked() {
        for url in [
            "http://127.0.0.1:8080/",
            "http://10.0.0.5/",
            "http://172.16.3.4/",
            "http://192.168.1.1/",
            "http://0.0.0.0/",
            "http://100.64.0.1/",
            "http://240.0.0.1/",
            "http://224.0.0.1/",
            "http://[::1]/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:127.0.0.1]/",
            // Alternate encodings of 127.0.0.1 parse to the same address.
            "http://2130706433/",
            "http://0x7f.0.0.1/",
        ] {
            assert!(!is_outbound_safe(url), "{url}");
        }
    }

    #[test]
    fn local_hostnames_are_blocked() {
        for url in [
            "http://localhost/",
            "http://LOCALHOST./",
            "http://api.localhost/",
            "http://ip6-localhost/",
        ] {
            assert!(!is_outbound_safe(url), "{url}");
        }
    }

    #[test]
    fn unparseable_or_hostless_urls_fail_closed() {
        assert_eq!(check_outbound("not a url"), Err(BlockReason::UnparseableUrl));
        assert_eq!(
            check_outbound("file:///etc/passwd"),
            Err(BlockReason::MissingHost)
        );
        assert!(!is_redirect_safe("data:text/plain,hi"));
    }

    #[test]
    fn redirects_require_trusted_hosts() {
        assert!(is_redirect_safe("https://objects.githubusercontent.com/x"));
        assert!(is_redirect_safe("https://github.com/typst/packages"));
        assert!(is_redirect_safe("https://packages.typst.org/preview/cetz-0.2.2.tar.gz"));

        for url in [
            "https://github.com.evil.example/",
            "https://evilgithub.com/",
            "https://example.com/",
            "https://140.82.112.3/",
            "http://127.0.0.1/",
        ] {
            assert!(!is_redirect_safe(url), "{url}");
        }
    }
}

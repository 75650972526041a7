use dashmap::DashMap;
use log::debug;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Resolved metadata for a single IP address. Either field may still be
/// empty while a background lookup is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpInfo {
    pub hostname: String,
    pub country: String,
}

impl IpInfo {
    pub fn is_empty(&self) -> bool {
        self.hostname.is_empty() && self.country.is_empty()
    }
}

/// Synchronous cache reads plus best-effort asynchronous fill-in.
///
/// `lookup` never blocks; `resolve` is idempotent and fire-and-forget.
pub trait Enricher: Send + Sync {
    fn lookup(&self, ip: &str) -> IpInfo;
    fn resolve(&self, ip: &str);
}

const GEOIP_TIMEOUT: Duration = Duration::from_secs(2);

/// Memoizes hostname and country per IP, launching reverse-DNS and GeoIP
/// tasks on miss. Entries never expire.
pub struct IpInfoCache {
    cache: Arc<DashMap<String, IpInfo>>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct GeoIpResponse {
    status: String,
    #[serde(rename = "countryCode", default)]
    country_code: String,
}

impl IpInfoCache {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(GEOIP_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self {
            cache: Arc::new(DashMap::new()),
            http,
        }
    }
}

impl Default for IpInfoCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Enricher for IpInfoCache {
    fn lookup(&self, ip: &str) -> IpInfo {
        self.cache.get(ip).map(|e| e.clone()).unwrap_or_default()
    }

    fn resolve(&self, ip: &str) {
        let parsed: IpAddr = match ip.parse() {
            Ok(addr) => addr,
            Err(_) => {
                // Not an address (e.g. empty ARP field); cache the blank so
                // callers stop asking.
                self.cache.entry(ip.to_string()).or_default();
                return;
            }
        };

        if is_private_ip(parsed) {
            let mut entry = self.cache.entry(ip.to_string()).or_default();
            if entry.country.is_empty() {
                entry.country = "Local".to_string();
            }
            return;
        }

        self.cache.entry(ip.to_string()).or_default();

        // Reverse DNS, off the async threads
        {
            let cache = self.cache.clone();
            let key = ip.to_string();
            tokio::spawn(async move {
                let result =
                    tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&parsed)).await;
                if let Ok(Ok(name)) = result {
                    merge_hostname(&cache, &key, name);
                }
            });
        }

        // GeoIP
        {
            let cache = self.cache.clone();
            let key = ip.to_string();
            let url = format!("http://ip-api.com/json/{}?fields=status,countryCode", ip);
            let http = self.http.clone();
            tokio::spawn(async move {
                let response = match http.get(&url).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        debug!("GeoIP request for {} failed: {}", key, e);
                        return;
                    }
                };
                match response.json::<GeoIpResponse>().await {
                    Ok(geo) if geo.status == "success" => {
                        merge_country(&cache, &key, geo.country_code);
                    }
                    Ok(_) => debug!("GeoIP lookup for {} not successful", key),
                    Err(e) => debug!("GeoIP response for {} unreadable: {}", key, e),
                }
            });
        }
    }
}

fn merge_hostname(cache: &DashMap<String, IpInfo>, ip: &str, name: String) {
    if name.is_empty() {
        return;
    }
    let mut entry = cache.entry(ip.to_string()).or_default();
    if entry.hostname.is_empty() {
        entry.hostname = name;
    }
}

fn merge_country(cache: &DashMap<String, IpInfo>, ip: &str, country: String) {
    if country.is_empty() {
        return;
    }
    let mut entry = cache.entry(ip.to_string()).or_default();
    if entry.country.is_empty() {
        entry.country = country;
    }
}

/// Private, loopback, link-local and IPv6 ULA ranges never get a GeoIP query.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            // fe80::/10 link-local, fc00::/7 unique-local
            v6.is_loopback() || (first & 0xffc0) == 0xfe80 || (first & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_classified() {
        for ip in [
            "10.1.2.3",
            "172.16.0.9",
            "172.31.255.1",
            "192.168.1.5",
            "127.0.0.1",
            "169.254.10.10",
            "fe80::1",
            "fc00::1",
            "fdab::2",
            "::1",
        ] {
            assert!(is_private_ip(ip.parse().unwrap()), "{} should be private", ip);
        }
        for ip in ["8.8.8.8", "1.1.1.1", "172.32.0.1", "2001:4860:4860::8888"] {
            assert!(!is_private_ip(ip.parse().unwrap()), "{} should be public", ip);
        }
    }

    #[test]
    fn local_addresses_resolve_synchronously() {
        // No runtime: the private-IP path must not spawn any tasks.
        let cache = IpInfoCache::new();
        cache.resolve("192.168.1.5");
        let info = cache.lookup("192.168.1.5");
        assert_eq!(info.hostname, "");
        assert_eq!(info.country, "Local");
    }

    #[test]
    fn lookup_on_unknown_ip_is_empty() {
        let cache = IpInfoCache::new();
        assert!(cache.lookup("203.0.113.9").is_empty());
    }

    #[test]
    fn merges_never_overwrite() {
        let cache: DashMap<String, IpInfo> = DashMap::new();
        merge_hostname(&cache, "1.2.3.4", "first.example.net".into());
        merge_hostname(&cache, "1.2.3.4", "second.example.net".into());
        merge_country(&cache, "1.2.3.4", "US".into());
        merge_country(&cache, "1.2.3.4", "DE".into());
        let entry = cache.get("1.2.3.4").unwrap();
        assert_eq!(entry.hostname, "first.example.net");
        assert_eq!(entry.country, "US");
    }

    #[test]
    fn duplicate_resolve_is_harmless() {
        let cache = IpInfoCache::new();
        cache.resolve("10.0.0.1");
        cache.resolve("10.0.0.1");
        assert_eq!(cache.lookup("10.0.0.1").country, "Local");
    }
}

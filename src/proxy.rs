//! Picks the network proxy to use when transmitting to a given URL.

use std::fmt;
use std::sync::Arc;
use url::Url;

use crate::error::UsageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    Http,
    Https,
    Socks,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyType::Http => "HTTP",
            ProxyType::Https => "HTTPS",
            ProxyType::Socks => "SOCKS",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyData {
    pub kind: ProxyType,
    pub host: String,
    pub port: u16,
    pub user_id: Option<String>,
    pub password: Option<String>,
}

impl ProxyData {
    pub fn new(kind: ProxyType, host: &str, port: u16) -> Self {
        ProxyData {
            kind,
            host: host.to_string(),
            port,
            user_id: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, user_id: &str, password: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// User and password, present when either one is set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.user_id.is_none() && self.password.is_none() {
            return None;
        }
        Some((
            self.user_id.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
        ))
    }

    /// Address of the proxy itself. Every proxy is spoken to over plain HTTP.
    pub fn proxy_url(&self) -> Result<Url, UsageError> {
        Ok(Url::parse(&format!("http://{}:{}", self.host, self.port))?)
    }

    pub fn to_reqwest_proxy(&self) -> Result<reqwest::Proxy, UsageError> {
        let proxy = reqwest::Proxy::all(self.proxy_url()?)
            .map_err(|e| UsageError::InvalidUrl(e.to_string()))?;
        Ok(match self.credentials() {
            Some((user, password)) => proxy.basic_auth(user, password),
            None => proxy,
        })
    }
}

/// The host's proxy settings.
#[cfg_attr(test, mockall::automock)]
pub trait ProxyService: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Candidate proxies for reaching `target`, most preferred first.
    fn select(&self, target: &Url) -> Vec<ProxyData>;
}

/// Chooses one proxy among several: a single candidate is taken as is,
/// otherwise the one matching the URL scheme, otherwise the first.
pub fn select_proxy<'a>(scheme: &str, proxies: &'a [ProxyData]) -> Option<&'a ProxyData> {
    if let [only] = proxies {
        return Some(only);
    }
    let wanted = if scheme.eq_ignore_ascii_case("http") {
        Some(ProxyType::Http)
    } else if scheme.eq_ignore_ascii_case("https") {
        Some(ProxyType::Https)
    } else {
        None
    };
    wanted
        .and_then(|kind| proxies.iter().find(|p| p.kind == kind))
        .or_else(|| proxies.first())
}

#[derive(Clone, Default)]
pub struct ProxyResolver {
    service: Option<Arc<dyn ProxyService>>,
}

impl ProxyResolver {
    pub fn new(service: Arc<dyn ProxyService>) -> Self {
        ProxyResolver {
            service: Some(service),
        }
    }

    /// Proxy to use for `target`, or `None` for a direct connection.
    /// Malformed URLs resolve to a direct connection.
    pub fn resolve(&self, target: &str) -> Option<ProxyData> {
        let service = self.service.as_ref()?;
        if !service.is_enabled() {
            return None;
        }
        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("not resolving proxy for '{}': {}", target, e);
                return None;
            }
        };
        let proxies = service.select(&url);
        select_proxy(url.scheme(), &proxies).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http() -> ProxyData {
        ProxyData::new(ProxyType::Http, "proxy.local", 3128)
    }

    fn https() -> ProxyData {
        ProxyData::new(ProxyType::Https, "secure.local", 3129)
    }

    #[test]
    fn single_candidate_is_used_directly() {
        let proxies = [https()];
        assert_eq!(select_proxy("http", &proxies), Some(&proxies[0]));
        assert_eq!(select_proxy("http", &[]), None);
    }

    #[test]
    fn scheme_match_is_preferred() {
        let proxies = [http(), https()];
        assert_eq!(select_proxy("https", &proxies).unwrap().kind, ProxyType::Https);
        assert_eq!(select_proxy("HTTP", &proxies).unwrap().kind, ProxyType::Http);
        assert_eq!(select_proxy("ftp", &proxies).unwrap().kind, ProxyType::Http);

        let socks_first = [ProxyData::new(ProxyType::Socks, "socks.local", 1080), http()];
        assert_eq!(select_proxy("https", &socks_first).unwrap().kind, ProxyType::Socks);
    }

    #[test]
    fn resolver_consults_service() {
        let mut service = MockProxyService::new();
        service.expect_is_enabled().return_const(true);
        service
            .expect_select()
            .withf(|url| url.host_str() == Some("uaa.example.com"))
            .times(1)
            .returning(|_| vec![http(), https()]);

        let resolver = ProxyResolver::new(Arc::new(service));
        let proxy = resolver.resolve("https://uaa.example.com/submit").unwrap();
        assert_eq!(proxy.host, "secure.local");
    }

    #[test]
    fn disabled_or_malformed_resolves_to_none() {
        let mut disabled = MockProxyService::new();
        disabled.expect_is_enabled().return_const(false);
        disabled.expect_select().never();
        assert_eq!(ProxyResolver::new(Arc::new(disabled)).resolve("https://a.b"), None);

        let mut enabled = MockProxyService::new();
        enabled.expect_is_enabled().return_const(true);
        enabled.expect_select().never();
        assert_eq!(ProxyResolver::new(Arc::new(enabled)).resolve("not a url"), None);

        assert_eq!(ProxyResolver::default().resolve("https://a.b"), None);
    }

    #[test]
    fn credentials_need_user_or_password() {
        assert_eq!(http().credentials(), None);
        let mut partial = http();
        partial.user_id = Some("alice".into());
        assert_eq!(partial.credentials(), Some(("alice", "")));
        assert_eq!(
            https().with_credentials("bob", "secret").credentials(),
            Some(("bob", "secret"))
        );
    }

    #[test]
    fn converts_to_reqwest_proxy() {
        let proxy = http().with_credentials("bob", "secret");
        assert_eq!(proxy.proxy_url().unwrap().as_str(), "http://proxy.local:3128/");
        assert!(proxy.to_reqwest_proxy().is_ok());
    }
}

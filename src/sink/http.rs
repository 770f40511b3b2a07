//! Posts usage payloads to a collection endpoint, through the host's proxy
//! when one applies to that endpoint.

use reqwest::{header, Client as HttpClient};
use tokio::runtime::Handle;
use url::Url;

use super::Transmitter;
use crate::error::UsageError;
use crate::proxy::{ProxyData, ProxyResolver};

pub struct HttpTransmitter {
    http_client: HttpClient,
    endpoint: Url,
    proxy: Option<ProxyData>,
    handle: Handle,
}

impl HttpTransmitter {
    /// The proxy is resolved once, here. Requests are sent on `handle`.
    pub fn new(endpoint: &str, resolver: &ProxyResolver, handle: Handle) -> Result<Self, UsageError> {
        let endpoint = Url::parse(endpoint)?;
        let proxy = resolver.resolve(endpoint.as_str());

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let builder = HttpClient::builder().default_headers(headers);
        let builder = match &proxy {
            Some(proxy) => builder.proxy(proxy.to_reqwest_proxy()?),
            None => builder.no_proxy(),
        };
        let http_client = builder
            .build()
            .map_err(|e| UsageError::InvalidConfiguration(e.to_string()))?;

        match &proxy {
            Some(proxy) => tracing::debug!("usage endpoint {} via {} proxy {}:{}", endpoint, proxy.kind, proxy.host, proxy.port),
            None => tracing::debug!("usage endpoint {} reached directly", endpoint),
        }

        Ok(HttpTransmitter {
            http_client,
            endpoint,
            proxy,
            handle,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn proxy(&self) -> Option<&ProxyData> {
        self.proxy.as_ref()
    }
}

impl Transmitter for HttpTransmitter {
    /// Queues the POST and returns. Delivery failures are only logged.
    fn transmit(&self, body: &[u8]) -> Result<(), UsageError> {
        let request = self.http_client.post(self.endpoint.clone()).body(body.to_vec());
        let endpoint = self.endpoint.clone();
        self.handle.spawn(async move {
            match request.send().await.and_then(|response| response.error_for_status()) {
                Ok(response) => tracing::debug!("{} accepted usage payload ({})", endpoint, response.status()),
                Err(e) => tracing::warn!("sending usage payload to {} failed: {}", endpoint, e),
            }
        });
        Ok(())
    }
}

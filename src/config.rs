// src/config.rs
use std::time::Duration;

/// Namespace of the vendor extensions served by Biconomy bundlers.
pub const BICONOMY_NAMESPACE: &str = "biconomy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlerClientConfig {
    pub url: String,
    /// Namespace for the vendor extension methods. `None` for generic bundlers.
    pub vendor_namespace: Option<String>,
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    // Receipt polling
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl BundlerClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            vendor_namespace: None,
            request_timeout: Duration::from_secs(30),
            max_concurrent_requests: 256,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_vendor_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.vendor_namespace = Some(namespace.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }
}

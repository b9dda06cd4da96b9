//! Timeout and retry around a vendor client.

use std::sync::Arc;
use std::time::Duration;

use idv_types::{CheckKind, CheckResult, IdvParams, Reason, Vendor};
use idv_utils::{retry_async, RetryError, RetryPolicy};

use crate::{CheckRequest, VendorCheckClient, VendorError};

/// A vendor client with an explicit per-try timeout and retry policy.
///
/// [`GuardedClient::run`] never fails: exhausted transient failures become a
/// `timed_out` result and business rejections become a failed result carrying
/// the classified exception.
#[derive(Clone)]
pub struct GuardedClient {
    client: Arc<dyn VendorCheckClient>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GuardedClient {
    pub fn new(client: Arc<dyn VendorCheckClient>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client,
            timeout,
            retry,
        }
    }

    pub fn from_params(client: Arc<dyn VendorCheckClient>, params: &IdvParams) -> Self {
        Self::new(
            client,
            Duration::from_millis(params.vendor_timeout_ms),
            RetryPolicy::from_params(&params.vendor_retry),
        )
    }

    pub fn kind(&self) -> CheckKind {
        self.client.kind()
    }

    pub fn vendor(&self) -> Vendor {
        self.client.vendor()
    }

    pub async fn run(&self, request: &CheckRequest) -> CheckResult {
        let kind = self.kind();
        let vendor = self.vendor();
        let client = &self.client;
        let timeout = self.timeout;

        let outcome = retry_async(&self.retry, kind.as_str(), |attempt| async move {
            tracing::debug!(%kind, %vendor, attempt, "calling vendor");
            match tokio::time::timeout(timeout, client.check(request)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(VendorError::Timeout),
            }
        })
        .await;

        match outcome {
            Ok(mut result) => {
                // The client's own kind and vendor are authoritative.
                result.kind = kind;
                result.vendor = vendor;
                result
            }
            Err(RetryError::Exhausted { attempts, last, .. }) => {
                tracing::warn!(%kind, %vendor, attempts, error = %last, "vendor check timed out");
                CheckResult::timed_out(kind, vendor, Some(last.to_string()))
            }
            Err(RetryError::Rejected { error, .. }) => {
                tracing::warn!(%kind, %vendor, %error, "vendor rejected request");
                let mut result = CheckResult::failed(kind, vendor, vec![Reason::new(error.code())]);
                result.exception = Some(error.to_string());
                result
            }
        }
    }
}

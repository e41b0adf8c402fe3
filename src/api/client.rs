//! A thin client for the HTTP facade.

use crate::types::{Call, CallResult, Kwargs, Result};
use crate::utils::config::HttpConfig;
use serde_json::Value;
use std::time::Duration;

/// Calls the facade's `POST /call` endpoint.
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// A client for the configured endpoint.
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}", config.address()),
        }
    }

    /// Invoke `function` and return the raw [`CallResult`].
    ///
    /// Only transport failures surface as errors; a handler failure comes
    /// back inside the result.
    pub async fn call(
        &self,
        function: &str,
        args: Vec<Value>,
        kwargs: Kwargs,
        timeout: Duration,
    ) -> Result<CallResult> {
        let body = Call {
            function: function.to_string(),
            args,
            kwargs,
        };

        let result: CallResult = self
            .client
            .post(format!("{}/call", self.base_url))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(result.normalized())
    }
}

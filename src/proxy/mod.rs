use crate::config::BindingConfig;
use crate::error::{Error, Result};
use crate::protocol::workers_ai::{BackendRequest, Envelope, GatewayOptions, RunOptions};
use crate::protocol::{BackendOutput, Binding};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, Response,
};
use tracing::{error, info};

/// 通过 Workers AI REST API（或 AI Gateway）调用模型
pub struct RestBinding {
    client: Client,
    // 流式请求专用，不设全局超时
    streaming_client: Client,
    account_id: String,
    api_token: String,
    base_url: String,
    gateway_base_url: String,
}

impl RestBinding {
    pub fn new(config: &BindingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(60))
            .tcp_keepalive(Some(std::time::Duration::from_secs(30)))
            .build()?;

        let streaming_client = Client::builder()
            .pool_idle_timeout(std::time::Duration::from_secs(60))
            .tcp_keepalive(Some(std::time::Duration::from_secs(30)))
            .build()?;

        Ok(Self {
            client,
            streaming_client,
            account_id: config.account_id.clone(),
            api_token: config.api_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            gateway_base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str, gateway: Option<&GatewayOptions>) -> String {
        match gateway {
            Some(gateway) => format!(
                "{}/{}/{}/workers-ai/{}",
                self.gateway_base_url, self.account_id, gateway.id, model
            ),
            None => format!(
                "{}/accounts/{}/ai/run/{}",
                self.base_url, self.account_id, model
            ),
        }
    }

    fn headers(&self, gateway: Option<&GatewayOptions>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&format!("Bearer {}", self.api_token))
                .map_err(|_| Error::Config("Invalid api token format".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(gateway) = gateway {
            if gateway.skip_cache {
                headers.insert(
                    HeaderName::from_static("cf-aig-skip-cache"),
                    HeaderValue::from_static("true"),
                );
            }
            if let Some(ttl) = gateway.cache_ttl {
                headers.insert(
                    HeaderName::from_static("cf-aig-cache-ttl"),
                    HeaderValue::from(ttl),
                );
            }
        }
        Ok(headers)
    }

    async fn send(
        &self,
        model: &str,
        request: &BackendRequest,
        options: &RunOptions,
    ) -> Result<Response> {
        let gateway = options.gateway.as_ref();
        let url = self.endpoint(model, gateway);
        info!(
            "send: start -> {} (stream={}, gateway={})",
            url,
            request.stream,
            gateway.map(|g| g.id.as_str()).unwrap_or("-")
        );

        let client = if request.stream {
            &self.streaming_client
        } else {
            &self.client
        };

        let response = client
            .post(&url)
            .headers(self.headers(gateway)?)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("HTTP client connection failed: {:?}", e);
                Error::Http(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .bytes()
                .await
                .unwrap_or_else(|_| Bytes::from("Failed to read error response"));

            error!(
                "Upstream error response (status {}): {}",
                status,
                String::from_utf8_lossy(&body)
            );

            return Err(Error::Backend(format!(
                "Upstream returned error status {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        Ok(response)
    }

    async fn process_response(&self, response: Response) -> Result<BackendOutput> {
        let body = response.bytes().await?;
        let envelope: Envelope = serde_json::from_slice(&body)?;

        if !envelope.success {
            let messages: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| match e.code {
                    Some(code) => format!("{} ({})", e.message, code),
                    None => e.message.clone(),
                })
                .collect();
            error!("Upstream reported failure: {}", messages.join("; "));
            return Err(Error::Backend(format!(
                "Upstream reported failure: {}",
                messages.join("; ")
            )));
        }

        Ok(BackendOutput::Structured(envelope.result.unwrap_or_default()))
    }
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("text/event-stream"))
        .unwrap_or(false)
}

#[async_trait]
impl Binding for RestBinding {
    async fn run(
        &self,
        model: &str,
        request: &BackendRequest,
        options: &RunOptions,
    ) -> Result<BackendOutput> {
        let response = self.send(model, request, options).await?;

        if !is_event_stream(&response) {
            return self.process_response(response).await;
        }

        info!("run: stream established (status {})", response.status());
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::Http));
        Ok(BackendOutput::Stream(Box::pin(stream)))
    }
}

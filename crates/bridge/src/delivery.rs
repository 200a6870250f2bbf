//! Entrega de frames ao collector HTTP.
//!
//! Cada frame é entregue numa task própria, com até N tentativas e backoff
//! linear (`base_delay × tentativa`). Rejeições 4xx são terminais; 5xx e
//! falhas de transporte são repetidas.

use factory_core::config::CollectorConfig;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Conteúdo entregue ao collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPayload {
    /// Frame bruto de duas linhas, `text/plain`
    Raw(String),
    /// Mesmo texto embrulhado em `{"sensorString": ...}`
    Structured(String),
}

/// Resultado de uma tentativa (ou da entrega inteira).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    RetryableFailure(String),
    TerminalFailure(String),
}

/// Requisição já montada para o transporte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorRequest {
    pub url: String,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorResponse {
    pub status: u16,
}

/// Falhas abaixo do HTTP (conexão, timeout).
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Timeout da requisição")]
    Timeout,

    #[error("Falha de conexão: {0}")]
    Connection(String),
}

/// Primitiva de envio usada pelo [`DeliveryClient`].
pub trait CollectorTransport: Send + Sync + 'static {
    fn send(
        &self,
        request: CollectorRequest,
    ) -> impl Future<Output = Result<CollectorResponse, TransportError>> + Send;
}

// ──────────────────────────────────────────────
// Transporte HTTP (reqwest)
// ──────────────────────────────────────────────

pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl HttpCollector {
    pub fn new(config: &CollectorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    /// Teste de conectividade: `GET {base}/sensor/current`.
    pub async fn probe(&self) -> Result<u16, TransportError> {
        let url = format!("{}/sensor/current", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(resp.status().as_u16())
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(e.to_string())
    }
}

impl CollectorTransport for HttpCollector {
    async fn send(&self, request: CollectorRequest) -> Result<CollectorResponse, TransportError> {
        let resp = self
            .client
            .post(&request.url)
            .header(CONTENT_TYPE, request.content_type)
            .header(USER_AGENT, &self.user_agent)
            .body(request.body)
            .send()
            .await
            .map_err(transport_error)?;
        Ok(CollectorResponse {
            status: resp.status().as_u16(),
        })
    }
}

// ──────────────────────────────────────────────
// Cliente com retry
// ──────────────────────────────────────────────

pub struct DeliveryClient<T> {
    transport: T,
    raw_url: String,
    structured_url: String,
    max_attempts: u32,
    base_delay: Duration,
}

impl<T: CollectorTransport> DeliveryClient<T> {
    pub fn new(transport: T, config: &CollectorConfig) -> Self {
        let base = config.base_url.trim_end_matches('/');
        Self {
            transport,
            raw_url: format!("{base}{}", config.raw_endpoint),
            structured_url: format!("{base}{}", config.structured_endpoint),
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }

    #[cfg(test)]
    fn transport(&self) -> &T {
        &self.transport
    }

    fn request_for(&self, payload: &DeliveryPayload) -> CollectorRequest {
        match payload {
            DeliveryPayload::Raw(text) => CollectorRequest {
                url: self.raw_url.clone(),
                content_type: "text/plain; charset=utf-8",
                body: text.clone(),
            },
            DeliveryPayload::Structured(text) => CollectorRequest {
                url: self.structured_url.clone(),
                content_type: "application/json",
                body: json!({ "sensorString": text }).to_string(),
            },
        }
    }

    /// Uma única tentativa, já classificada.
    pub async fn attempt(&self, payload: &DeliveryPayload) -> DeliveryOutcome {
        match self.transport.send(self.request_for(payload)).await {
            Ok(resp) if (200..300).contains(&resp.status) => DeliveryOutcome::Success,
            Ok(resp) if (400..500).contains(&resp.status) => {
                DeliveryOutcome::TerminalFailure(format!("collector rejeitou com HTTP {}", resp.status))
            }
            Ok(resp) => DeliveryOutcome::RetryableFailure(format!("HTTP {}", resp.status)),
            Err(e) => DeliveryOutcome::RetryableFailure(e.to_string()),
        }
    }

    /// Entrega com retry. Retorna só `Success` ou `TerminalFailure`.
    pub async fn deliver(
        &self,
        payload: &DeliveryPayload,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let mut last_reason = String::new();

        for attempt in 1..=self.max_attempts {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(),
                outcome = self.attempt(payload) => outcome,
            };

            match outcome {
                DeliveryOutcome::Success => {
                    if attempt > 1 {
                        info!("Entrega concluída na tentativa {attempt}");
                    } else {
                        debug!("Frame entregue ao collector");
                    }
                    return DeliveryOutcome::Success;
                }
                DeliveryOutcome::TerminalFailure(reason) => {
                    warn!("Entrega rejeitada, sem retry: {reason}");
                    return DeliveryOutcome::TerminalFailure(reason);
                }
                DeliveryOutcome::RetryableFailure(reason) => {
                    warn!(
                        "Tentativa {attempt}/{} de entrega falhou: {reason}",
                        self.max_attempts
                    );
                    last_reason = reason;
                }
            }

            if attempt < self.max_attempts {
                let delay = self.base_delay * attempt;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return cancelled(),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        DeliveryOutcome::TerminalFailure(format!(
            "{} tentativas esgotadas: {last_reason}",
            self.max_attempts
        ))
    }
}

fn cancelled() -> DeliveryOutcome {
    DeliveryOutcome::TerminalFailure("cancelado".into())
}

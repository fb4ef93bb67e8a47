//! HTTP POST transport

use std::time::Duration;

use async_trait::async_trait;
use kiosk_cashu::nuts::{PaymentRequestPayload, Transport, TransportType};
use reqwest::Client;

use super::{Delivery, PaymentTransport};
use crate::Error;

/// Posts the payload as JSON to the transport target
#[derive(Debug, Clone)]
pub struct HttpPostTransport {
    client: Client,
}

impl HttpPostTransport {
    /// Create new [`HttpPostTransport`]
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl PaymentTransport for HttpPostTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::HttpPost
    }

    #[tracing::instrument(skip_all, fields(url = %target.target))]
    async fn deliver(
        &self,
        target: &Transport,
        payload: &PaymentRequestPayload,
    ) -> Result<Delivery, Error> {
        let res = self
            .client
            .post(target.target.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST {} failed: {e}", target.target)))?;

        let status = res.status();
        if status.is_success() {
            tracing::debug!("Posted payment to {}", target.target);
            Ok(Delivery::HttpPost {
                url: target.target.clone(),
                status: status.as_u16(),
            })
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(Error::Transport(format!(
                "POST {} returned {}: {}",
                target.target,
                status.as_u16(),
                body.trim()
            )))
        }
    }
}

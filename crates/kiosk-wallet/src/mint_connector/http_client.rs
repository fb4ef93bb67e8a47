use std::time::Duration;

use async_trait::async_trait;
use kiosk_cashu::nuts::{
    CheckStateRequest, CheckStateResponse, MeltQuoteBolt11Request, MeltQuoteBolt11Response,
    MeltRequest, MeltResponse, MintInfo, MintKeys, SwapRequest, SwapResponse,
};
use kiosk_cashu::MintUrl;
use reqwest::{Client, IntoUrl, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use super::MintConnector;
use crate::error::ErrorResponse;
use crate::Error;

fn http_error(err: reqwest::Error) -> Error {
    Error::HttpError(
        err.status().map(|status_code| status_code.as_u16()),
        err.to_string(),
    )
}

/// Decode a response body
///
/// A success status must carry `R`. The mint error shape is only read from
/// error statuses, or from a success body that is not `R` but has a `code`
/// or `detail`.
fn decode_body<R: DeserializeOwned>(status: u16, body: &str) -> Result<R, Error> {
    if (200..300).contains(&status) {
        return serde_json::from_str::<R>(body).map_err(|err| {
            tracing::warn!("Http Response error: {}", err);
            match ErrorResponse::parse(body) {
                Some(res) => res.into(),
                None => err.into(),
            }
        });
    }

    match ErrorResponse::parse(body) {
        Some(res) => Err(res.into()),
        None => Err(Error::HttpError(Some(status), body.to_string())),
    }
}

async fn decode<R: DeserializeOwned>(response: Response) -> Result<R, Error> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(http_error)?;
    decode_body(status, &body)
}

#[derive(Debug, Clone)]
struct HttpClientCore {
    inner: Client,
}

impl HttpClientCore {
    fn new(timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: builder.build()?,
        })
    }

    async fn http_get<U: IntoUrl + Send, R: DeserializeOwned>(&self, url: U) -> Result<R, Error> {
        let response = self.inner.get(url).send().await.map_err(http_error)?;
        decode(response).await
    }

    async fn http_post<U: IntoUrl + Send, P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: U,
        payload: &P,
    ) -> Result<R, Error> {
        let response = self
            .inner
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(http_error)?;
        decode(response).await
    }
}

/// Http Client
#[derive(Debug, Clone)]
pub struct HttpClient {
    core: HttpClientCore,
}

impl HttpClient {
    /// Create new [`HttpClient`]
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            core: HttpClientCore::new(None)?,
        })
    }

    /// Create new [`HttpClient`] with a per request timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            core: HttpClientCore::new(Some(timeout))?,
        })
    }
}

#[async_trait]
impl MintConnector for HttpClient {
    /// Get Mint Info [NUT-06]
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    async fn get_mint_info(&self, mint_url: &MintUrl) -> Result<MintInfo, Error> {
        let url = mint_url.join_paths(&["v1", "info"])?;
        self.core.http_get(url).await
    }

    /// Get Active Mint Keys [NUT-01]
    #[instrument(skip(self), fields(mint_url = %mint_url))]
    async fn get_mint_keys(&self, mint_url: &MintUrl) -> Result<MintKeys, Error> {
        let url = mint_url.join_paths(&["v1", "keys"])?;
        self.core.http_get(url).await
    }

    /// Spendable check [NUT-07]
    #[instrument(skip(self, request), fields(mint_url = %mint_url))]
    async fn post_check_state(
        &self,
        mint_url: &MintUrl,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        let path = match request {
            CheckStateRequest::Ys { .. } => "checkstate",
            CheckStateRequest::Proofs { .. } => "check",
        };
        let url = mint_url.join_paths(&["v1", path])?;
        self.core.http_post(url, &request).await
    }

    /// Swap Token [NUT-03]
    #[instrument(skip(self, request), fields(mint_url = %mint_url))]
    async fn post_swap(
        &self,
        mint_url: &MintUrl,
        request: SwapRequest,
    ) -> Result<SwapResponse, Error> {
        let url = mint_url.join_paths(&["v1", "swap"])?;
        self.core.http_post(url, &request).await
    }

    /// Melt Quote [NUT-05]
    #[instrument(skip(self, request), fields(mint_url = %mint_url))]
    async fn post_melt_quote(
        &self,
        mint_url: &MintUrl,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        let url = mint_url.join_paths(&["v1", "melt", "quote", "bolt11"])?;
        self.core.http_post(url, &request).await
    }

    /// Melt [NUT-05]
    #[instrument(skip(self, request), fields(mint_url = %mint_url))]
    async fn post_melt(
        &self,
        mint_url: &MintUrl,
        request: MeltRequest,
    ) -> Result<MeltResponse, Error> {
        let url = mint_url.join_paths(&["v1", "melt", "bolt11"])?;
        self.core.http_post(url, &request).await
    }
}

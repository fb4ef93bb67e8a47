//! Wallet client

use std::fmt::Debug;

use async_trait::async_trait;
use kiosk_cashu::nuts::{
    CheckStateRequest, CheckStateResponse, MeltQuoteBolt11Request, MeltQuoteBolt11Response,
    MeltRequest, MeltResponse, MintInfo, MintKeys, SwapRequest, SwapResponse,
};
use kiosk_cashu::MintUrl;

use crate::Error;

pub mod http_client;

pub use http_client::HttpClient;

/// Interface that connects a wallet to a mint. Typically represents an [HttpClient].
///
/// Every call names the mint it talks to, the ledger may hold proofs of
/// several mints.
#[async_trait]
pub trait MintConnector: Debug + Send + Sync {
    /// Get Mint Info [NUT-06]
    async fn get_mint_info(&self, mint_url: &MintUrl) -> Result<MintInfo, Error>;

    /// Get Active Mint Keys [NUT-01]
    async fn get_mint_keys(&self, mint_url: &MintUrl) -> Result<MintKeys, Error>;

    /// Spendable check [NUT-07]
    ///
    /// [`CheckStateRequest::Ys`] goes to `/v1/checkstate`, the legacy
    /// [`CheckStateRequest::Proofs`] form to `/v1/check`.
    async fn post_check_state(
        &self,
        mint_url: &MintUrl,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error>;

    /// Swap Token [NUT-03]
    async fn post_swap(
        &self,
        mint_url: &MintUrl,
        request: SwapRequest,
    ) -> Result<SwapResponse, Error>;

    /// Melt Quote [NUT-05]
    async fn post_melt_quote(
        &self,
        mint_url: &MintUrl,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error>;

    /// Melt [NUT-05]
    async fn post_melt(
        &self,
        mint_url: &MintUrl,
        request: MeltRequest,
    ) -> Result<MeltResponse, Error>;
}

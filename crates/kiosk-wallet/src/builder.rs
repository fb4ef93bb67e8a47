use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::blinding::{default_engine, BlindingEngine};
use crate::check::PROBE_TIMEOUT;
use crate::config::Settings;
use crate::ledger::{ProofLedger, MINT_URL_KEY};
use crate::lightning_address::{BackendQuoteResolver, LightningAddressResolver, LnurlPayResolver};
use crate::mint_connector::{HttpClient, MintConnector};
use crate::settle::Wallet;
use crate::store::{FileStore, KeyValueStore};
use crate::transport::{HttpPostTransport, NostrSdkPublisher, NostrTransport, PaymentTransport};
use crate::Error;

/// Builder for creating a new [`Wallet`]
#[derive(Debug, Default)]
pub struct WalletBuilder {
    ledger: Option<Arc<ProofLedger>>,
    client: Option<Arc<dyn MintConnector>>,
    engine: Option<Arc<dyn BlindingEngine>>,
    transports: Vec<Arc<dyn PaymentTransport>>,
    resolver: Option<Arc<dyn LightningAddressResolver>>,
    probe_timeout: Option<Duration>,
}

impl WalletBuilder {
    /// Create a new WalletBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the proof ledger
    pub fn ledger(mut self, ledger: Arc<ProofLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Set a custom client connector
    pub fn client<C: MintConnector + 'static>(mut self, client: C) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Set a custom client connector from Arc
    pub fn shared_client(mut self, client: Arc<dyn MintConnector>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the blinding engine
    pub fn engine(mut self, engine: Arc<dyn BlindingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Add a payment transport
    ///
    /// A later transport of the same type is never used.
    pub fn transport(mut self, transport: Arc<dyn PaymentTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    /// Set the lightning address resolver
    pub fn resolver(mut self, resolver: Arc<dyn LightningAddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the mint probe timeout
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }

    /// Build the wallet
    pub fn build(self) -> Result<Wallet, Error> {
        let ledger = self
            .ledger
            .ok_or_else(|| Error::Validation("Ledger required".to_string()))?;

        let connector = match self.client {
            Some(client) => client,
            None => Arc::new(HttpClient::new()?) as Arc<dyn MintConnector>,
        };

        Ok(Wallet {
            connector,
            engine: self.engine.unwrap_or_else(default_engine),
            ledger,
            transports: self.transports,
            resolver: self.resolver,
            probe_timeout: self.probe_timeout.unwrap_or(PROBE_TIMEOUT),
        })
    }
}

impl Wallet {
    /// Wallet over the file store in the configured work dir
    ///
    /// The configured mint becomes the default mint unless the ledger
    /// already stores one.
    pub async fn from_settings(settings: &Settings) -> Result<Self, Error> {
        let work_dir = settings
            .work_dir()
            .ok_or_else(|| Error::Storage("Unknown home directory".to_string()))?;

        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&work_dir).await?);
        let has_mint = store.get(MINT_URL_KEY).await?.is_some();

        let ledger = Arc::new(ProofLedger::load(store).await?);
        if !has_mint {
            ledger.set_mint_url(&settings.mint_url).await?;
        }

        let http_timeout = settings.http_timeout();

        let publisher = Arc::new(NostrSdkPublisher::new(
            settings.relay_connect_timeout(),
            settings.relay_publish_timeout(),
        ));

        let resolver: Arc<dyn LightningAddressResolver> = match &settings.backend_url {
            Some(backend_url) => Arc::new(BackendQuoteResolver::new(
                Url::parse(backend_url)?,
                http_timeout,
            )?),
            None => Arc::new(LnurlPayResolver::new(http_timeout)?),
        };

        WalletBuilder::new()
            .ledger(ledger)
            .client(HttpClient::with_timeout(http_timeout)?)
            .transport(Arc::new(HttpPostTransport::new(http_timeout)?))
            .transport(Arc::new(NostrTransport::new(
                publisher,
                settings.relays.clone(),
            )))
            .resolver(resolver)
            .probe_timeout(settings.probe_timeout())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_build_requires_ledger() {
        let err = WalletBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_build_defaults() {
        let ledger = Arc::new(
            ProofLedger::load(Arc::new(MemoryStore::new()))
                .await
                .unwrap(),
        );
        let wallet = WalletBuilder::new().ledger(ledger).build().unwrap();
        assert_eq!(wallet.probe_timeout, PROBE_TIMEOUT);
        assert!(wallet.transports.is_empty());
        assert!(wallet.resolver.is_none());
    }

    #[tokio::test]
    async fn test_from_settings_sets_mint_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            mint_url: "mint.example.com".to_string(),
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let wallet = Wallet::from_settings(&settings).await.unwrap();
        assert_eq!(wallet.mint_url().await.as_str(), "https://mint.example.com");
        assert_eq!(wallet.transports.len(), 2);

        wallet
            .ledger()
            .set_mint_url("https://other.mint")
            .await
            .unwrap();
        let reopened = Wallet::from_settings(&settings).await.unwrap();
        assert_eq!(reopened.mint_url().await.as_str(), "https://other.mint");
    }
}

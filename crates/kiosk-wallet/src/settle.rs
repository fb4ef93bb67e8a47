//! Settlement
//!
//! Pays NUT-18 payment requests, BOLT11 invoices and lightning addresses out
//! of the ledger, and takes incoming tokens into it.
//!
//! Ledger changes after a swap or melt remove the spent inputs before adding
//! the proofs the mint returned. A crash in between under-counts the ledger,
//! it never holds the same value twice.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use kiosk_cashu::nuts::{
    BlindSignature, MeltQuoteBolt11Request, MeltRequest, MeltResponse, MintKeys, PaymentRequest,
    PaymentRequestPayload, Proof, Proofs, ProofsMethods, SwapRequest,
};
use kiosk_cashu::{parse_token, Amount, MintUrl};
use tracing::instrument;

use crate::blinding::{
    create_blinded_outputs, signatures_to_proofs, BlindedOutputs, BlindingEngine, OutputData,
};
use crate::check::{check_mint_availability, remove_spent_proofs, MintAvailability};
use crate::input::{detect_input, SendInput};
use crate::ledger::{AddResult, PendingOutputs, ProofLedger, RemoveResult};
use crate::lightning_address::LightningAddressResolver;
use crate::mint_connector::MintConnector;
use crate::transport::{select_transport, Delivery, PaymentTransport};
use crate::Error;

/// Unit used when a request names none
pub const DEFAULT_UNIT: &str = "sat";

const PAID_STATES: [&str; 2] = ["PAID", "PENDING"];

/// Result of a completed send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Payment request settled over its transport
    Delivered {
        /// Amount delivered
        amount: Amount,
        /// Change added back to the ledger
        change: Amount,
        /// Where the payload went
        delivery: Delivery,
    },
    /// Invoice paid by the mint
    Paid {
        /// Melt quote id
        quote: String,
        /// Invoice amount
        amount: Amount,
        /// Fee reserve the inputs covered
        fee_reserve: Amount,
        /// Change added back to the ledger
        change: Amount,
        /// Melt state reported by the mint
        state: Option<String>,
        /// Payment preimage
        payment_preimage: Option<String>,
    },
}

impl SendOutcome {
    /// Amount that left the wallet, not counting fees
    pub fn amount(&self) -> Amount {
        match self {
            Self::Delivered { amount, .. } | Self::Paid { amount, .. } => *amount,
        }
    }

    /// Change returned to the ledger
    pub fn change(&self) -> Amount {
        match self {
            Self::Delivered { change, .. } | Self::Paid { change, .. } => *change,
        }
    }
}

/// Kiosk wallet
///
/// Ties the ledger to a mint connector, a blinding engine and the payment
/// transports. Build one with [`crate::WalletBuilder`].
#[derive(Debug, Clone)]
pub struct Wallet {
    pub(crate) connector: Arc<dyn MintConnector>,
    pub(crate) engine: Arc<dyn BlindingEngine>,
    pub(crate) ledger: Arc<ProofLedger>,
    pub(crate) transports: Vec<Arc<dyn PaymentTransport>>,
    pub(crate) resolver: Option<Arc<dyn LightningAddressResolver>>,
    pub(crate) probe_timeout: Duration,
}

impl Wallet {
    /// Proof ledger
    pub fn ledger(&self) -> &Arc<ProofLedger> {
        &self.ledger
    }

    /// Default mint
    pub async fn mint_url(&self) -> MintUrl {
        self.ledger.mint_url().await
    }

    /// Total balance
    pub async fn total_balance(&self) -> Amount {
        self.ledger.total().await
    }

    /// Pay whatever `input` is
    ///
    /// `amount` is required for lightning addresses and for payment requests
    /// without an amount, ignored otherwise.
    #[instrument(skip(self, input))]
    pub async fn send(&self, input: &str, amount: Option<Amount>) -> Result<SendOutcome, Error> {
        match detect_input(input)? {
            SendInput::PaymentRequest(request) => self.pay_request(&request, amount).await,
            SendInput::Bolt11(invoice) => self.pay_invoice(&invoice).await,
            SendInput::LightningAddress(address) => {
                let amount = amount
                    .filter(|amount| *amount > Amount::ZERO)
                    .ok_or_else(|| Error::Validation("Amount is required".to_string()))?;
                self.pay_address(&address, amount).await
            }
        }
    }

    /// Pay a NUT-18 payment request
    ///
    /// Swaps the selected proofs into exact payment proofs plus change, then
    /// hands the payment to the request's transport. The minted proofs are
    /// in the ledger before delivery starts, so a failed or abandoned
    /// delivery keeps them and only a delivered payment removes them.
    #[instrument(skip(self, request), fields(id = ?request.payment_id))]
    pub async fn pay_request(
        &self,
        request: &PaymentRequest,
        custom_amount: Option<Amount>,
    ) -> Result<SendOutcome, Error> {
        let amount = request
            .amount
            .or(custom_amount)
            .filter(|amount| *amount > Amount::ZERO)
            .ok_or_else(|| Error::Validation("Invalid amount".to_string()))?;

        let mint_url = self.ledger.mint_url().await;

        if let Some(mints) = request.mints.as_ref().filter(|mints| !mints.is_empty()) {
            if !mints.iter().any(|mint| mint_url.matches(mint)) {
                return Err(Error::MintMismatch(format!(
                    "request accepts {} but the wallet uses {}",
                    mints.join(", "),
                    mint_url
                )));
            }
        }

        let (target, sender) =
            select_transport(request, &self.transports).ok_or(Error::NoTransport)?;

        let inputs = self.select_verified(&mint_url, amount).await?;
        let inputs_total = Amount::try_sum(inputs.iter().map(|p| p.amount))?;

        let keys = self.connector.get_mint_keys(&mint_url).await?;
        let payment = create_blinded_outputs(self.engine.as_ref(), amount, &keys).await?;
        let change = self.change_outputs(inputs_total, amount, &keys).await?;

        let BlindedOutputs {
            mut outputs,
            mut output_datas,
        } = payment;
        let payment_count = output_datas.len();
        outputs.extend(change.outputs.iter().cloned());
        output_datas.extend(change.output_datas);

        let swap_request = SwapRequest {
            inputs: inputs.without_mint_url(),
            outputs,
        };
        let mut payment_proofs = self
            .swap(&mint_url, swap_request, &inputs, &keys, output_datas)
            .await?;
        let change_proofs = payment_proofs.split_off(payment_count);
        let change = Amount::try_sum(change_proofs.iter().map(|p| p.amount))?;

        let payload = PaymentRequestPayload {
            id: request.payment_id.clone(),
            amount: Some(amount),
            memo: request.description.clone(),
            mint: mint_url.to_string(),
            unit: request
                .unit
                .clone()
                .unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            proofs: payment_proofs.clone(),
        };

        // Payment proofs stay in the ledger until the receiver has them
        match sender.deliver(target, &payload).await {
            Ok(delivery) => {
                self.ledger.remove_proofs(&payment_proofs).await?;
                tracing::debug!("Delivered payment of {}", amount);
                Ok(SendOutcome::Delivered {
                    amount,
                    change,
                    delivery,
                })
            }
            Err(err) => {
                tracing::error!(
                    "Payment delivery failed, keeping {} minted proofs: {}",
                    payment_proofs.len() + change_proofs.len(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Pay a BOLT11 invoice through the default mint
    #[instrument(skip(self, invoice))]
    pub async fn pay_invoice(&self, invoice: &str) -> Result<SendOutcome, Error> {
        let mint_url = self.ledger.mint_url().await;

        let quote = self
            .connector
            .post_melt_quote(
                &mint_url,
                MeltQuoteBolt11Request {
                    request: invoice.to_string(),
                    unit: DEFAULT_UNIT.to_string(),
                },
            )
            .await?;

        let required = quote
            .required()
            .filter(|required| *required > Amount::ZERO)
            .ok_or_else(|| Error::Protocol("melt quote has no payable amount".to_string()))?;

        tracing::debug!(
            "Melt quote {}: amount {}, fee reserve {}",
            quote.quote,
            quote.amount,
            quote.fee_reserve
        );

        let inputs = self.select_verified(&mint_url, required).await?;
        let inputs_total = Amount::try_sum(inputs.iter().map(|p| p.amount))?;

        let (keys, change) = if inputs_total > required {
            let keys = self.connector.get_mint_keys(&mint_url).await?;
            let change = self.change_outputs(inputs_total, required, &keys).await?;
            (Some(keys), change)
        } else {
            (None, BlindedOutputs::default())
        };

        let melt_request = MeltRequest {
            quote: quote.quote.clone(),
            inputs: inputs.without_mint_url(),
            outputs: (!change.outputs.is_empty()).then(|| change.outputs.clone()),
        };
        let response = self.melt(&mint_url, melt_request, &inputs).await?;

        if response
            .state
            .as_deref()
            .is_some_and(|state| !PAID_STATES.iter().any(|s| state.eq_ignore_ascii_case(s)))
        {
            return Err(Error::Settlement(format!(
                "Lightning payment failed, melt state {}",
                response.state.as_deref().unwrap_or_default()
            )));
        }

        let change_proofs = match (&response.change, &keys) {
            (Some(signatures), Some(keys)) if !signatures.is_empty() => {
                self.unblind_change(signatures, keys, &change.output_datas)
                    .await
            }
            _ => Vec::new(),
        };
        let change_amount = Amount::try_sum(change_proofs.iter().map(|p| p.amount))?;

        self.reconcile(&inputs, change_proofs, &mint_url).await?;

        Ok(SendOutcome::Paid {
            quote: quote.quote,
            amount: quote.amount,
            fee_reserve: quote.fee_reserve,
            change: change_amount,
            state: response.state,
            payment_preimage: response.payment_preimage,
        })
    }

    /// Pay a lightning address or LNURL
    #[instrument(skip(self))]
    pub async fn pay_address(&self, address: &str, amount: Amount) -> Result<SendOutcome, Error> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            Error::Validation("Lightning addresses are not supported without a resolver".to_string())
        })?;

        let invoice = resolver.resolve(address, amount).await?;
        tracing::debug!("Resolved {} to an invoice", address);

        self.pay_invoice(&invoice).await
    }

    /// Add the proofs of a token to the ledger
    ///
    /// Every proof is stamped with the mint of its token entry.
    #[instrument(skip_all)]
    pub async fn receive(&self, token: &str) -> Result<AddResult, Error> {
        let parsed = parse_token(token)?;
        let default_mint = self.ledger.mint_url().await;

        let mut proofs = Vec::new();
        for entry in parsed.entries {
            let mint = if entry.mint.trim().is_empty() {
                default_mint.to_string()
            } else {
                entry
                    .mint
                    .parse::<MintUrl>()
                    .map(|mint| mint.to_string())
                    .unwrap_or(entry.mint)
            };

            proofs.extend(entry.proofs.into_iter().map(|mut proof| {
                proof.mint_url = Some(mint.clone());
                proof
            }));
        }

        if proofs.is_empty() {
            return Err(Error::Validation("Token holds no proofs".to_string()));
        }

        let result = self.ledger.add_proofs(proofs, None).await?;
        tracing::debug!("Received {} new proofs", result.added);
        Ok(result)
    }

    /// Drop every proof its mint reports as spent
    ///
    /// Mints that cannot be reached are skipped.
    #[instrument(skip(self))]
    pub async fn remove_spent(&self) -> Result<RemoveResult, Error> {
        let default_mint = self.ledger.mint_url().await;

        let mut by_mint: BTreeMap<String, Proofs> = BTreeMap::new();
        for proof in self.ledger.snapshot().await {
            let mint = proof
                .mint_url
                .clone()
                .unwrap_or_else(|| default_mint.to_string());
            by_mint.entry(mint).or_default().push(proof);
        }

        let mut spent = Vec::new();
        for (mint, proofs) in by_mint {
            let mint_url: MintUrl = match mint.parse() {
                Ok(mint_url) => mint_url,
                Err(err) => {
                    tracing::warn!("Skipping proofs of invalid mint {}: {}", mint, err);
                    continue;
                }
            };

            match remove_spent_proofs(
                self.connector.as_ref(),
                self.engine.as_ref(),
                &mint_url,
                &proofs,
            )
            .await
            {
                Ok(check) => spent.extend(check.spent),
                Err(err) => tracing::warn!("Could not check proofs of {}: {}", mint_url, err),
            }
        }

        self.ledger.remove_proofs(&spent).await
    }

    /// Probe `mint_url`, the default mint when `None`
    pub async fn check_mint(&self, mint_url: Option<&MintUrl>) -> MintAvailability {
        let mint_url = match mint_url {
            Some(mint_url) => mint_url.clone(),
            None => self.ledger.mint_url().await,
        };
        check_mint_availability(self.connector.as_ref(), &mint_url, self.probe_timeout).await
    }

    /// Select proofs covering `required`, all from `mint_url`
    async fn select(&self, mint_url: &MintUrl, required: Amount) -> Result<Proofs, Error> {
        let selection = self.ledger.select_proofs_for_amount(required).await;
        if !selection.ok {
            return Err(Error::InsufficientFunds {
                required,
                available: self.ledger.total().await,
            });
        }

        if let Some(foreign) = selection
            .picked
            .iter()
            .filter_map(|proof| proof.mint_url.as_deref())
            .find(|mint| !mint_url.matches(mint))
        {
            return Err(Error::MintMismatch(format!(
                "proofs from {foreign} cannot be spent at {mint_url}"
            )));
        }

        Ok(selection.picked)
    }

    /// [`Self::select`] followed by a best effort state check
    ///
    /// Spent proofs leave the ledger right away and selection runs once more
    /// if the rest does not cover `required`. A failed check keeps the
    /// original selection.
    async fn select_verified(&self, mint_url: &MintUrl, required: Amount) -> Result<Proofs, Error> {
        let picked = self.select(mint_url, required).await?;

        let check = match remove_spent_proofs(
            self.connector.as_ref(),
            self.engine.as_ref(),
            mint_url,
            &picked,
        )
        .await
        {
            Ok(check) => check,
            Err(err) => {
                tracing::warn!(
                    "Failed to verify proof state, proceeding with original selection: {}",
                    err
                );
                return Ok(picked);
            }
        };

        if check.spent.is_empty() {
            return Ok(picked);
        }

        tracing::warn!(
            "Found {} spent proofs, removing from ledger",
            check.spent.len()
        );
        self.ledger.remove_proofs(&check.spent).await?;

        let remaining = Amount::try_sum(check.unspent.iter().map(|p| p.amount))?;
        if remaining >= required {
            return Ok(check.unspent);
        }

        match self.select(mint_url, required).await {
            Err(Error::InsufficientFunds { available, .. }) => {
                Err(Error::InsufficientAfterCleanup {
                    required,
                    available,
                })
            }
            other => other,
        }
    }

    async fn change_outputs(
        &self,
        inputs_total: Amount,
        amount: Amount,
        keys: &MintKeys,
    ) -> Result<BlindedOutputs, Error> {
        match inputs_total.checked_sub(amount) {
            Some(change) if change > Amount::ZERO => {
                create_blinded_outputs(self.engine.as_ref(), change, keys).await
            }
            _ => Ok(BlindedOutputs::default()),
        }
    }

    /// Swap, unblind and hold the minted proofs on a spawned task
    ///
    /// When this returns `Ok` the inputs have left the ledger and every
    /// minted proof is in it, also if the caller was dropped in between.
    /// Signatures that cannot be unblinded are kept as [`PendingOutputs`].
    async fn swap(
        &self,
        mint_url: &MintUrl,
        request: SwapRequest,
        inputs: &[Proof],
        keys: &MintKeys,
        output_datas: Vec<OutputData>,
    ) -> Result<Proofs, Error> {
        let wallet = self.clone();
        let mint = mint_url.clone();
        let inputs = inputs.to_vec();
        let keys = keys.clone();

        tokio::spawn(async move {
            let result = wallet.connector.post_swap(&mint, request).await;
            let response = wallet.exchange_result(result, &inputs).await?;

            let minted = match signatures_to_proofs(
                wallet.engine.as_ref(),
                &response.signatures,
                &keys,
                &output_datas,
            )
            .await
            {
                Ok(minted) => minted,
                Err(err) => {
                    tracing::error!(
                        "Could not unblind swap signatures, keeping {} outputs for recovery: {}",
                        output_datas.len(),
                        err
                    );
                    wallet
                        .ledger
                        .add_pending_outputs(PendingOutputs {
                            mint_url: mint.to_string(),
                            outputs: output_datas.iter().map(OutputData::to_serialized).collect(),
                            signatures: response.signatures,
                        })
                        .await?;
                    wallet.ledger.remove_proofs(&inputs).await?;
                    return Err(err);
                }
            };

            wallet.reconcile(&inputs, minted.clone(), &mint).await?;
            Ok::<_, Error>(minted)
        })
        .await
        .map_err(|e| Error::Protocol(format!("swap task failed: {e}")))?
    }

    /// Melt on a spawned task so a dropped caller cannot abandon it
    async fn melt(
        &self,
        mint_url: &MintUrl,
        request: MeltRequest,
        inputs: &[Proof],
    ) -> Result<MeltResponse, Error> {
        let connector = self.connector.clone();
        let mint = mint_url.clone();
        let result = tokio::spawn(async move { connector.post_melt(&mint, request).await })
            .await
            .map_err(|e| Error::Protocol(format!("melt task failed: {e}")))?;

        self.exchange_result(result, inputs).await
    }

    /// Inputs the mint reports as redeemed leave the ledger
    async fn exchange_result<T>(
        &self,
        result: Result<T, Error>,
        inputs: &[Proof],
    ) -> Result<T, Error> {
        match result {
            Ok(response) => Ok(response),
            Err(err) if err.is_already_spent() => {
                tracing::warn!("Mint reports inputs as spent, removing {} proofs", inputs.len());
                self.ledger.remove_proofs(inputs).await?;
                Err(match err {
                    Error::AlreadySpent(detail) => Error::AlreadySpent(detail),
                    other => Error::AlreadySpent(other.to_string()),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Change proofs of a melt, empty if they cannot be unblinded
    ///
    /// The mint may sign fewer outputs than it was given, signatures pair
    /// with the leading outputs.
    async fn unblind_change(
        &self,
        signatures: &[BlindSignature],
        keys: &MintKeys,
        output_datas: &[OutputData],
    ) -> Vec<Proof> {
        let paired = output_datas
            .get(..signatures.len())
            .unwrap_or(output_datas);

        match signatures_to_proofs(self.engine.as_ref(), signatures, keys, paired).await {
            Ok(proofs) => proofs,
            Err(err) => {
                tracing::error!("Could not unblind melt change: {}", err);
                Vec::new()
            }
        }
    }

    /// Drop the spent inputs, then add the minted proofs
    async fn reconcile(
        &self,
        inputs: &[Proof],
        minted: Proofs,
        mint_url: &MintUrl,
    ) -> Result<(), Error> {
        self.ledger.remove_proofs(inputs).await?;
        if !minted.is_empty() {
            self.ledger
                .add_proofs(minted, Some(mint_url.as_str()))
                .await?;
        }
        Ok(())
    }
}

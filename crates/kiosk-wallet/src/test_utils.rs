#![cfg(test)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kiosk_cashu::nuts::{
    BlindSignature, BlindedMessage, CheckStateRequest, CheckStateResponse, Keyset,
    MeltQuoteBolt11Request, MeltQuoteBolt11Response, MeltRequest, MeltResponse, MintInfo,
    MintKeys, PaymentRequestPayload, Proof, SwapRequest, SwapResponse, Transport, TransportType,
};
use kiosk_cashu::{Amount, MintUrl};
use nostr_sdk::Event;

use crate::blinding::{BlindingEngine, OutputData};
use crate::mint_connector::MintConnector;
use crate::transport::{Delivery, PaymentTransport, RelayPublisher};
use crate::Error;

pub const TEST_KEYSET_ID: &str = "009a1f293253e41e";

/// Keyset with a key for every power of two up to 2^10
pub fn test_keys() -> MintKeys {
    let keys: BTreeMap<String, String> = (0..=10)
        .map(|exp| {
            let amount = 1u64 << exp;
            (amount.to_string(), format!("02{:064x}", amount))
        })
        .collect();

    MintKeys {
        keysets: vec![Keyset {
            id: TEST_KEYSET_ID.to_string(),
            unit: Some("sat".to_string()),
            active: Some(true),
            keys,
            ..Default::default()
        }],
        current_keyset: None,
    }
}

/// Create a test proof
pub fn test_proof(amount: u64, secret: &str) -> Proof {
    Proof::new(
        Amount::from(amount),
        TEST_KEYSET_ID.to_string(),
        secret.to_string(),
        format!("02{:064x}", amount),
    )
}

/// Signature the mock mint returns for `output`
pub fn fake_signature(output: &BlindedMessage) -> BlindSignature {
    BlindSignature {
        amount: output.amount,
        keyset_id: output.keyset_id.clone(),
        c: format!("C_{}", output.blinded_secret),
        dleq: None,
    }
}

fn no_response(endpoint: &str) -> Error {
    Error::HttpError(Some(404), format!("{endpoint}: no response configured"))
}

fn replay<T: Clone>(stored: &Mutex<Option<Result<T, String>>>, endpoint: &str) -> Result<T, Error> {
    match stored.lock().unwrap().as_ref() {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(message)) => Err(Error::HttpError(Some(500), message.clone())),
        None => Err(no_response(endpoint)),
    }
}

/// Mock MintConnector
///
/// Info and keys answer the configured value on every call. Check state,
/// swap, melt quote and melt pop queued responses; an empty swap or melt
/// queue signs every output.
#[derive(Debug, Default)]
pub struct MockMintConnector {
    mint_info: Mutex<Option<Result<MintInfo, String>>>,
    mint_keys: Mutex<Option<Result<MintKeys, String>>>,
    check_state_responses: Mutex<VecDeque<Result<CheckStateResponse, Error>>>,
    swap_responses: Mutex<VecDeque<Result<SwapResponse, Error>>>,
    melt_quote_responses: Mutex<VecDeque<Result<MeltQuoteBolt11Response, Error>>>,
    melt_responses: Mutex<VecDeque<Result<MeltResponse, Error>>>,
    check_state_requests: Mutex<Vec<CheckStateRequest>>,
    swap_requests: Mutex<Vec<SwapRequest>>,
    melt_quote_requests: Mutex<Vec<MeltQuoteBolt11Request>>,
    melt_requests: Mutex<Vec<MeltRequest>>,
}

impl MockMintConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mint_info(&self, response: Result<MintInfo, Error>) {
        *self.mint_info.lock().unwrap() = Some(response.map_err(|e| e.to_string()));
    }

    pub fn set_mint_keys(&self, response: Result<MintKeys, Error>) {
        *self.mint_keys.lock().unwrap() = Some(response.map_err(|e| e.to_string()));
    }

    pub fn push_check_state_response(&self, response: Result<CheckStateResponse, Error>) {
        self.check_state_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    pub fn push_swap_response(&self, response: Result<SwapResponse, Error>) {
        self.swap_responses.lock().unwrap().push_back(response);
    }

    pub fn push_melt_quote_response(&self, response: Result<MeltQuoteBolt11Response, Error>) {
        self.melt_quote_responses
            .lock()
            .unwrap()
            .push_back(response);
    }

    pub fn push_melt_response(&self, response: Result<MeltResponse, Error>) {
        self.melt_responses.lock().unwrap().push_back(response);
    }

    pub fn check_state_requests(&self) -> Vec<CheckStateRequest> {
        self.check_state_requests.lock().unwrap().clone()
    }

    pub fn swap_requests(&self) -> Vec<SwapRequest> {
        self.swap_requests.lock().unwrap().clone()
    }

    pub fn melt_quote_requests(&self) -> Vec<MeltQuoteBolt11Request> {
        self.melt_quote_requests.lock().unwrap().clone()
    }

    pub fn melt_requests(&self) -> Vec<MeltRequest> {
        self.melt_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MintConnector for MockMintConnector {
    async fn get_mint_info(&self, _mint_url: &MintUrl) -> Result<MintInfo, Error> {
        replay(&self.mint_info, "/v1/info")
    }

    async fn get_mint_keys(&self, _mint_url: &MintUrl) -> Result<MintKeys, Error> {
        replay(&self.mint_keys, "/v1/keys")
    }

    async fn post_check_state(
        &self,
        _mint_url: &MintUrl,
        request: CheckStateRequest,
    ) -> Result<CheckStateResponse, Error> {
        self.check_state_requests.lock().unwrap().push(request);
        self.check_state_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(no_response("/v1/checkstate")))
    }

    async fn post_swap(
        &self,
        _mint_url: &MintUrl,
        request: SwapRequest,
    ) -> Result<SwapResponse, Error> {
        self.swap_requests.lock().unwrap().push(request.clone());
        match self.swap_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(SwapResponse {
                signatures: request.outputs.iter().map(fake_signature).collect(),
            }),
        }
    }

    async fn post_melt_quote(
        &self,
        _mint_url: &MintUrl,
        request: MeltQuoteBolt11Request,
    ) -> Result<MeltQuoteBolt11Response, Error> {
        self.melt_quote_requests.lock().unwrap().push(request);
        self.melt_quote_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(no_response("/v1/melt/quote/bolt11")))
    }

    async fn post_melt(
        &self,
        _mint_url: &MintUrl,
        request: MeltRequest,
    ) -> Result<MeltResponse, Error> {
        self.melt_requests.lock().unwrap().push(request.clone());
        match self.melt_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(MeltResponse {
                state: Some("PAID".to_string()),
                payment_preimage: Some("00".repeat(32)),
                change: request
                    .outputs
                    .map(|outputs| outputs.iter().map(fake_signature).collect()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum OutputMode {
    #[default]
    WithAmounts,
    WithoutAmounts,
    Count(usize),
}

/// Deterministic [`BlindingEngine`] without curve math
#[derive(Debug, Default)]
pub struct FakeBlindingEngine {
    mode: OutputMode,
    counter: AtomicUsize,
}

impl FakeBlindingEngine {
    /// Outputs leave the amount for the caller to assign
    pub fn without_amounts() -> Self {
        Self {
            mode: OutputMode::WithoutAmounts,
            ..Default::default()
        }
    }

    /// Always `count` outputs without amounts
    pub fn with_output_count(count: usize) -> Self {
        Self {
            mode: OutputMode::Count(count),
            ..Default::default()
        }
    }

    fn output(&self, amount: Option<Amount>) -> OutputData {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        OutputData {
            blinded_message: format!("B_{n}"),
            blinding_factor: format!("r{n}"),
            secret: format!("fake-secret-{n}").into_bytes(),
            amount,
            keyset_id: String::new(),
        }
    }
}

#[async_trait]
impl BlindingEngine for FakeBlindingEngine {
    async fn create_outputs(
        &self,
        amount: Amount,
        _keyset: &Keyset,
    ) -> Result<Vec<OutputData>, Error> {
        Ok(match self.mode {
            OutputMode::WithAmounts => amount
                .split()
                .into_iter()
                .map(|part| self.output(Some(part)))
                .collect(),
            OutputMode::WithoutAmounts => amount
                .split()
                .into_iter()
                .map(|_| self.output(None))
                .collect(),
            OutputMode::Count(count) => (0..count).map(|_| self.output(None)).collect(),
        })
    }

    async fn to_proof(
        &self,
        signature: &BlindSignature,
        output: &OutputData,
        keyset: &Keyset,
    ) -> Result<Proof, Error> {
        let secret = String::from_utf8(output.secret.clone())
            .map_err(|_| Error::Protocol("output secret is not utf-8".to_string()))?;
        Ok(Proof::new(
            signature.amount,
            keyset.id.clone(),
            secret,
            format!("C:{}", signature.c),
        ))
    }

    fn y(&self, secret: &str) -> Option<String> {
        Some(format!("Y:{secret}"))
    }
}

/// Transport recording every payload
#[derive(Debug)]
pub struct RecordingTransport {
    transport_type: TransportType,
    failure: Mutex<Option<String>>,
    stalled: Mutex<bool>,
    payloads: Mutex<Vec<PaymentRequestPayload>>,
}

impl RecordingTransport {
    pub fn new(transport_type: TransportType) -> Self {
        Self {
            transport_type,
            failure: Mutex::new(None),
            stalled: Mutex::new(false),
            payloads: Mutex::new(Vec::new()),
        }
    }

    /// Every following delivery fails with `message`
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    /// Every following delivery never completes
    pub fn stall(&self) {
        *self.stalled.lock().unwrap() = true;
    }

    pub fn payloads(&self) -> Vec<PaymentRequestPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentTransport for RecordingTransport {
    fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    async fn deliver(
        &self,
        target: &Transport,
        payload: &PaymentRequestPayload,
    ) -> Result<Delivery, Error> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Transport(message));
        }
        let stalled = *self.stalled.lock().unwrap();
        if stalled {
            std::future::pending::<()>().await;
        }

        self.payloads.lock().unwrap().push(payload.clone());
        Ok(match self.transport_type {
            TransportType::HttpPost => Delivery::HttpPost {
                url: target.target.clone(),
                status: 200,
            },
            TransportType::Nostr => Delivery::Nostr {
                relay: "wss://relay.test".to_string(),
                event_id: "00".repeat(32),
            },
        })
    }
}

/// Relay publisher that acknowledges everything except the listed relays
#[derive(Debug, Default)]
pub struct FakeRelayPublisher {
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
    events: Mutex<Vec<Event>>,
}

impl FakeRelayPublisher {
    pub fn failing(relays: &[&str]) -> Self {
        Self {
            failing: relays
                .iter()
                .map(|relay| relay.trim_end_matches('/').to_string())
                .collect(),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayPublisher for FakeRelayPublisher {
    async fn publish(&self, relay: &str, event: &Event) -> Result<(), Error> {
        let relay = relay.trim_end_matches('/').to_string();
        self.attempts.lock().unwrap().push(relay.clone());

        if self.failing.contains(&relay) {
            return Err(Error::Transport(format!("{relay} refused the connection")));
        }

        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

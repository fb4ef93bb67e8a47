//! Proof ledger
//!
//! Every locally held proof, grouped by the mint that issued it. All
//! mutations merge, de-duplicate and persist under one lock, the store is
//! written before the in-memory state changes.

use std::collections::HashMap;
use std::sync::Arc;

use kiosk_cashu::nuts::nut00::token::normalize_proof;
use kiosk_cashu::nuts::{BlindSignature, Proof, Proofs};
use kiosk_cashu::{dedup_proofs, Amount, MintUrl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::blinding::SerializedOutputData;
use crate::store::KeyValueStore;
use crate::Error;

/// Store key of the proof list
pub const PROOFS_KEY: &str = "cashu_proofs_v2";
/// Store key of the default mint url
pub const MINT_URL_KEY: &str = "cashu_mint_url";
/// Store key of swap outputs that were signed but could not be unblinded
pub const PENDING_OUTPUTS_KEY: &str = "cashu_pending_outputs";

/// Outcome of adding proofs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AddResult {
    /// Proofs that were not held before
    pub added: usize,
    /// Proofs held afterwards
    pub total: usize,
}

/// Outcome of removing proofs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveResult {
    /// Proofs dropped
    pub removed: usize,
    /// Proofs held afterwards
    pub total: usize,
}

/// Proofs picked to cover an amount
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Target was reached
    pub ok: bool,
    /// Picked proofs, empty unless `ok`
    pub picked: Proofs,
    /// Value of `picked`
    pub total: Amount,
}

/// Balance held at one mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Holding {
    /// Mint url
    pub mint_url: String,
    /// Sum of proof amounts
    pub amount: Amount,
    /// Number of proofs
    pub count: usize,
}

/// Input accepted by [`ProofLedger::import_proofs`]
#[derive(Debug, Clone)]
pub enum ProofImport {
    /// JSON text
    Text(String),
    /// Parsed JSON
    Json(Value),
    /// Proofs
    Proofs(Proofs),
}

impl From<&str> for ProofImport {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ProofImport {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for ProofImport {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Proofs> for ProofImport {
    fn from(proofs: Proofs) -> Self {
        Self::Proofs(proofs)
    }
}

/// Pick proofs largest first until `target` is covered
///
/// Ties keep ledger order. Returns an empty selection when the target is
/// zero or the proofs do not cover it.
pub fn select_proofs(proofs: &[Proof], target: Amount) -> Selection {
    if target == Amount::ZERO {
        return Selection::default();
    }

    let mut available = dedup_proofs(proofs.to_vec());
    available.sort_by(|a, b| b.amount.cmp(&a.amount));

    let mut picked = Vec::new();
    let mut total = Amount::ZERO;
    for proof in available {
        total = match total.checked_add(proof.amount) {
            Some(total) => total,
            None => break,
        };
        picked.push(proof);
        if total >= target {
            return Selection {
                ok: true,
                picked,
                total,
            };
        }
    }

    Selection::default()
}

/// Proofs from a persisted value, a list or `{"proofs": [..]}`
///
/// Entries that do not normalize into a valid proof are dropped.
fn proofs_from_json(value: &Value) -> Option<Proofs> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("proofs")?.as_array()?,
        _ => return None,
    };
    Some(
        items
            .iter()
            .filter_map(|item| normalize_proof(item, None))
            .collect(),
    )
}

/// Signed swap outputs kept until they can be unblinded
///
/// The inputs of the swap are already spent, these are the only claim on
/// the value the mint minted for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOutputs {
    /// Mint that signed the outputs
    pub mint_url: String,
    /// Secret material of every output, in request order
    pub outputs: Vec<SerializedOutputData>,
    /// Signatures as returned by the mint
    pub signatures: Vec<BlindSignature>,
}

#[derive(Debug, Default)]
struct LedgerState {
    mint_url: MintUrl,
    proofs: Proofs,
}

/// Local proof ledger
#[derive(Debug)]
pub struct ProofLedger {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<LedgerState>,
}

impl ProofLedger {
    /// Load the ledger from `store`
    ///
    /// An unreadable proof list fails the load instead of being replaced, so
    /// the stored value is never overwritten by an empty ledger.
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, Error> {
        let mint_url = match store.get(MINT_URL_KEY).await? {
            Some(raw) => raw.parse::<MintUrl>().unwrap_or_else(|err| {
                tracing::warn!("Stored mint url {} is invalid: {}", raw, err);
                MintUrl::default()
            }),
            None => MintUrl::default(),
        };

        let proofs = match store.get(PROOFS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => {
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|e| Error::Storage(format!("stored proofs are not json: {e}")))?;
                proofs_from_json(&value)
                    .ok_or_else(|| Error::Storage("stored proofs are not a list".to_string()))?
            }
            _ => Vec::new(),
        };

        let proofs: Proofs = dedup_proofs(proofs)
            .into_iter()
            .map(|mut proof| {
                if proof.mint_url.is_none() {
                    proof.mint_url = Some(mint_url.to_string());
                }
                proof
            })
            .collect();

        tracing::debug!("Loaded {} proofs, default mint {}", proofs.len(), mint_url);

        Ok(Self {
            store,
            state: Mutex::new(LedgerState { mint_url, proofs }),
        })
    }

    async fn persist(&self, proofs: &Proofs) -> Result<(), Error> {
        let raw = serde_json::to_string(proofs)?;
        self.store.set(PROOFS_KEY, &raw).await
    }

    /// Default mint
    pub async fn mint_url(&self) -> MintUrl {
        self.state.lock().await.mint_url.clone()
    }

    /// Change the default mint, returns the normalized url
    pub async fn set_mint_url(&self, mint_url: &str) -> Result<MintUrl, Error> {
        let mint_url: MintUrl = mint_url.parse()?;
        let mut state = self.state.lock().await;
        self.store.set(MINT_URL_KEY, mint_url.as_str()).await?;
        state.mint_url = mint_url.clone();
        Ok(mint_url)
    }

    /// Add proofs, stamping a missing mint with `mint_override` or the default mint
    pub async fn add_proofs(
        &self,
        proofs: Proofs,
        mint_override: Option<&str>,
    ) -> Result<AddResult, Error> {
        let mut state = self.state.lock().await;
        let before = state.proofs.len();

        let stamp = mint_override
            .map(str::to_string)
            .unwrap_or_else(|| state.mint_url.to_string());

        let incoming: Proofs = proofs
            .into_iter()
            .filter(|proof| {
                let valid = proof.is_valid();
                if !valid {
                    tracing::warn!("Skipping proof without amount or secret");
                }
                valid
            })
            .map(|mut proof| {
                if proof.mint_url.as_deref().is_none_or(str::is_empty) {
                    proof.mint_url = Some(stamp.clone());
                }
                proof
            })
            .collect();

        if incoming.is_empty() {
            return Ok(AddResult {
                added: 0,
                total: before,
            });
        }

        let merged = dedup_proofs(state.proofs.iter().cloned().chain(incoming).collect());
        self.persist(&merged).await?;
        state.proofs = merged;

        let total = state.proofs.len();
        Ok(AddResult {
            added: total.saturating_sub(before),
            total,
        })
    }

    /// Remove proofs matching by secret, absent proofs are ignored
    pub async fn remove_proofs(&self, proofs: &[Proof]) -> Result<RemoveResult, Error> {
        let mut state = self.state.lock().await;
        let before = state.proofs.len();
        if proofs.is_empty() {
            return Ok(RemoveResult {
                removed: 0,
                total: before,
            });
        }

        let remaining: Proofs = state
            .proofs
            .iter()
            .filter(|held| !proofs.iter().any(|p| p.same_as(held)))
            .cloned()
            .collect();

        if remaining.len() != before {
            self.persist(&remaining).await?;
            state.proofs = remaining;
        }

        let total = state.proofs.len();
        Ok(RemoveResult {
            removed: before - total,
            total,
        })
    }

    /// Replace the whole proof list
    pub async fn set_proofs(&self, proofs: Proofs) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let proofs = dedup_proofs(proofs);
        self.persist(&proofs).await?;
        state.proofs = proofs;
        Ok(())
    }

    /// Keep `pending` for a later recovery, returns how many records are held
    pub async fn add_pending_outputs(&self, pending: PendingOutputs) -> Result<usize, Error> {
        let _state = self.state.lock().await;
        let mut records = self.read_pending_outputs().await?;
        records.push(pending);
        let raw = serde_json::to_string(&records)?;
        self.store.set(PENDING_OUTPUTS_KEY, &raw).await?;
        Ok(records.len())
    }

    /// Every held [`PendingOutputs`] record, oldest first
    pub async fn pending_outputs(&self) -> Result<Vec<PendingOutputs>, Error> {
        let _state = self.state.lock().await;
        self.read_pending_outputs().await
    }

    async fn read_pending_outputs(&self) -> Result<Vec<PendingOutputs>, Error> {
        match self.store.get(PENDING_OUTPUTS_KEY).await? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map_err(|e| Error::Storage(format!("stored pending outputs are invalid: {e}"))),
            _ => Ok(Vec::new()),
        }
    }

    /// Proofs covering `target`, see [`select_proofs`]
    pub async fn select_proofs_for_amount(&self, target: Amount) -> Selection {
        select_proofs(&self.state.lock().await.proofs, target)
    }

    /// Copy of every held proof
    pub async fn snapshot(&self) -> Proofs {
        dedup_proofs(self.state.lock().await.proofs.clone())
    }

    /// Sum of every held proof
    pub async fn total(&self) -> Amount {
        let state = self.state.lock().await;
        Amount::try_sum(state.proofs.iter().map(|p| p.amount)).unwrap_or_else(|err| {
            tracing::warn!("Ledger total overflows: {}", err);
            Amount::from(u64::MAX)
        })
    }

    /// Balance per mint, largest first
    pub async fn holdings(&self) -> Vec<Holding> {
        let state = self.state.lock().await;
        let mut by_mint: HashMap<String, Holding> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for proof in &state.proofs {
            let mint = proof
                .mint_url
                .clone()
                .unwrap_or_else(|| state.mint_url.to_string());
            let entry = by_mint.entry(mint.clone()).or_insert_with(|| {
                order.push(mint.clone());
                Holding {
                    mint_url: mint,
                    amount: Amount::ZERO,
                    count: 0,
                }
            });
            entry.amount = entry.amount.checked_add(proof.amount).unwrap_or(entry.amount);
            entry.count += 1;
        }

        let mut holdings: Vec<Holding> = order
            .into_iter()
            .filter_map(|mint| by_mint.remove(&mint))
            .collect();
        holdings.sort_by(|a, b| b.amount.cmp(&a.amount));
        holdings
    }

    /// Proofs as JSON text
    pub async fn export_proofs(&self, pretty: bool) -> String {
        let proofs = self.snapshot().await;
        let exported = if pretty {
            serde_json::to_string_pretty(&proofs)
        } else {
            serde_json::to_string(&proofs)
        };
        exported.unwrap_or_else(|err| {
            tracing::error!("Failed to export proofs: {}", err);
            "[]".to_string()
        })
    }

    /// Import proofs from JSON text, parsed JSON or a list
    ///
    /// Malformed input adds nothing and is not an error.
    pub async fn import_proofs<I>(&self, input: I) -> Result<AddResult, Error>
    where
        I: Into<ProofImport>,
    {
        let parsed = match input.into() {
            ProofImport::Proofs(proofs) => Some(proofs),
            ProofImport::Json(value) => proofs_from_json(&value),
            ProofImport::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => proofs_from_json(&value),
                Err(err) => {
                    tracing::warn!("Failed to import proofs: {}", err);
                    None
                }
            },
        };

        match parsed {
            Some(proofs) => self.add_proofs(proofs, None).await,
            None => Ok(AddResult {
                added: 0,
                total: self.state.lock().await.proofs.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_utils::test_proof;

    async fn ledger() -> ProofLedger {
        ProofLedger::load(Arc::new(MemoryStore::new())).await.unwrap()
    }

    #[test]
    fn test_select_largest_first() {
        let a = test_proof(4, "a");
        let b = test_proof(2, "b");
        let c = test_proof(1, "c");

        let selection = select_proofs(&[c.clone(), b.clone(), a.clone()], Amount::from(5));
        assert!(selection.ok);
        assert_eq!(selection.picked, vec![a, b]);
        assert_eq!(selection.total, Amount::from(6));
    }

    #[test]
    fn test_select_insufficient_or_zero() {
        let proofs = vec![test_proof(4, "a"), test_proof(2, "b")];

        let selection = select_proofs(&proofs, Amount::from(7));
        assert_eq!(selection, Selection::default());

        let selection = select_proofs(&proofs, Amount::ZERO);
        assert!(!selection.ok);
        assert!(selection.picked.is_empty());
    }

    #[test]
    fn test_select_ties_keep_order() {
        let proofs = vec![test_proof(2, "x"), test_proof(2, "y"), test_proof(2, "z")];
        let selection = select_proofs(&proofs, Amount::from(3));
        let secrets: Vec<&str> = selection.picked.iter().map(|p| p.secret.as_str()).collect();
        assert_eq!(secrets, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let ledger = ledger().await;
        let proofs = vec![test_proof(4, "a"), test_proof(2, "b")];

        let first = ledger.add_proofs(proofs.clone(), None).await.unwrap();
        assert_eq!(first, AddResult { added: 2, total: 2 });

        let second = ledger.add_proofs(proofs, None).await.unwrap();
        assert_eq!(second, AddResult { added: 0, total: 2 });
    }

    #[tokio::test]
    async fn test_add_stamps_mint() {
        let ledger = ledger().await;
        let stamped = test_proof(1, "s").with_mint_url("https://other.mint");

        ledger
            .add_proofs(vec![test_proof(4, "a")], None)
            .await
            .unwrap();
        ledger
            .add_proofs(vec![test_proof(2, "b")], Some("https://override.mint"))
            .await
            .unwrap();
        ledger
            .add_proofs(vec![stamped], Some("https://override.mint"))
            .await
            .unwrap();

        let mints: Vec<Option<String>> = ledger
            .snapshot()
            .await
            .into_iter()
            .map(|p| p.mint_url)
            .collect();
        assert_eq!(
            mints,
            vec![
                Some("https://mint.coinos.io".to_string()),
                Some("https://override.mint".to_string()),
                Some("https://other.mint".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_skips_invalid_proofs() {
        let ledger = ledger().await;
        let result = ledger
            .add_proofs(vec![test_proof(0, "zero"), test_proof(1, "")], None)
            .await
            .unwrap();
        assert_eq!(result, AddResult { added: 0, total: 0 });
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let ledger = ledger().await;
        let a = test_proof(4, "a");
        let b = test_proof(2, "b");
        ledger
            .add_proofs(vec![a.clone(), b.clone()], None)
            .await
            .unwrap();

        let result = ledger.remove_proofs(&[a.clone()]).await.unwrap();
        assert_eq!(result, RemoveResult { removed: 1, total: 1 });

        let result = ledger.remove_proofs(&[a]).await.unwrap();
        assert_eq!(result, RemoveResult { removed: 0, total: 1 });
        assert_eq!(ledger.total().await, Amount::from(2));
    }

    #[tokio::test]
    async fn test_set_proofs_replaces_and_persists() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ledger = ProofLedger::load(store.clone()).await.unwrap();
        ledger
            .add_proofs(vec![test_proof(8, "a")], None)
            .await
            .unwrap();

        let b = test_proof(2, "b");
        ledger
            .set_proofs(vec![b.clone(), b.clone()])
            .await
            .unwrap();
        assert_eq!(ledger.snapshot().await, vec![b.clone()]);

        let reloaded = ProofLedger::load(store).await.unwrap();
        assert_eq!(reloaded.total().await, Amount::from(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_are_not_lost() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ledger = Arc::new(ProofLedger::load(store.clone()).await.unwrap());
        let doomed: Vec<Proof> = (0..16).map(|i| test_proof(1, &format!("old{i}"))).collect();
        ledger.add_proofs(doomed.clone(), None).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..32u64 {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger
                    .add_proofs(vec![test_proof(2, &format!("new{i}"))], None)
                    .await
                    .unwrap();
            }));
        }
        for proof in doomed {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                ledger.remove_proofs(&[proof]).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let held = ledger.snapshot().await;
        assert_eq!(held.len(), 32);
        assert!(held.iter().all(|p| p.secret.starts_with("new")));
        assert_eq!(ledger.total().await, Amount::from(64));

        let reloaded = ProofLedger::load(store).await.unwrap();
        assert_eq!(reloaded.total().await, Amount::from(64));
        assert_eq!(reloaded.snapshot().await.len(), 32);
    }

    #[tokio::test]
    async fn test_pending_outputs_survive_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ledger = ProofLedger::load(store.clone()).await.unwrap();
        assert!(ledger.pending_outputs().await.unwrap().is_empty());

        let record = PendingOutputs {
            mint_url: "https://mint.coinos.io".to_string(),
            outputs: vec![SerializedOutputData {
                blinded_message: "02aa".to_string(),
                blinding_factor: "11".repeat(32),
                secret: "736563726574".to_string(),
                amount: Some(Amount::from(4)),
                keyset_id: "009a1f293253e41e".to_string(),
            }],
            signatures: vec![],
        };
        assert_eq!(ledger.add_pending_outputs(record.clone()).await.unwrap(), 1);
        assert_eq!(ledger.add_pending_outputs(record.clone()).await.unwrap(), 2);

        let reloaded = ProofLedger::load(store).await.unwrap();
        let records = reloaded.pending_outputs().await.unwrap();
        assert_eq!(records, vec![record.clone(), record]);
        assert_eq!(reloaded.total().await, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let ledger = ProofLedger::load(store.clone()).await.unwrap();
        ledger.set_mint_url("Mint.Example.com/").await.unwrap();
        ledger
            .add_proofs(vec![test_proof(8, "a"), test_proof(1, "b")], None)
            .await
            .unwrap();

        let reloaded = ProofLedger::load(store).await.unwrap();
        assert_eq!(reloaded.mint_url().await.as_str(), "https://mint.example.com");
        assert_eq!(reloaded.snapshot().await, ledger.snapshot().await);
    }

    #[tokio::test]
    async fn test_load_stamps_and_dedups() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store
            .set(
                PROOFS_KEY,
                r#"{"proofs": [
                    {"amount": 2, "secret": "a", "C": "02aa", "id": "00ff"},
                    {"amount": 2, "secret": "a", "C": "02aa", "id": "00ff"},
                    {"amount": 0, "secret": "b", "C": "02bb", "id": "00ff"}
                ]}"#,
            )
            .await
            .unwrap();

        let ledger = ProofLedger::load(store).await.unwrap();
        let proofs = ledger.snapshot().await;
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].mint_url.as_deref(), Some("https://mint.coinos.io"));
    }

    #[tokio::test]
    async fn test_load_refuses_corrupt_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(PROOFS_KEY, "not json").await.unwrap();

        let err = ProofLedger::load(store.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(store.get(PROOFS_KEY).await.unwrap().as_deref(), Some("not json"));
    }

    #[tokio::test]
    async fn test_import_export() {
        let ledger = ledger().await;
        ledger
            .add_proofs(vec![test_proof(4, "a"), test_proof(2, "b")], None)
            .await
            .unwrap();
        let exported = ledger.export_proofs(false).await;

        let other = self::ledger().await;
        let result = other.import_proofs(exported.as_str()).await.unwrap();
        assert_eq!(result, AddResult { added: 2, total: 2 });

        let result = other.import_proofs("{ broken").await.unwrap();
        assert_eq!(result, AddResult { added: 0, total: 2 });

        let result = other
            .import_proofs(serde_json::json!({"not": "proofs"}))
            .await
            .unwrap();
        assert_eq!(result, AddResult { added: 0, total: 2 });
    }

    #[tokio::test]
    async fn test_holdings() {
        let ledger = ledger().await;
        ledger
            .add_proofs(vec![test_proof(1, "a")], Some("https://small.mint"))
            .await
            .unwrap();
        ledger
            .add_proofs(
                vec![test_proof(4, "b"), test_proof(2, "c")],
                Some("https://big.mint"),
            )
            .await
            .unwrap();

        let holdings = ledger.holdings().await;
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].mint_url, "https://big.mint");
        assert_eq!(holdings[0].amount, Amount::from(6));
        assert_eq!(holdings[0].count, 2);
        assert_eq!(holdings[1].amount, Amount::from(1));
    }
}

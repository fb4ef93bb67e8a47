//! Blinded outputs
//!
//! Builds the outputs a mint signs during a swap or melt and turns the
//! returned signatures back into proofs. The curve arithmetic lives behind
//! [`BlindingEngine`]; this module owns amount splitting, keyset selection
//! and the pairing of outputs with signatures.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::hex::{DisplayHex, FromHex};
use cashu::dhke::{blind_message, hash_to_curve, unblind_message};
use cashu::nuts::{PublicKey, SecretKey};
use kiosk_cashu::nuts::{BlindSignature, BlindedMessage, Keyset, MintKeys, Proof, ProofDleq};
use kiosk_cashu::Amount;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::Error;

/// Secret material for one blinded output
///
/// Owned by a single swap or melt. The secret and blinding factor are wiped
/// on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputData {
    /// Blinded message `B_`, hex
    pub blinded_message: String,
    /// Blinding factor `r`, hex
    pub blinding_factor: String,
    /// Secret
    pub secret: Vec<u8>,
    /// Amount, when the engine assigned one
    pub amount: Option<Amount>,
    /// Keyset the output is blinded against
    pub keyset_id: String,
}

impl fmt::Debug for OutputData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputData")
            .field("blinded_message", &self.blinded_message)
            .field("blinding_factor", &"[redacted]")
            .field("secret", &"[redacted]")
            .field("amount", &self.amount)
            .field("keyset_id", &self.keyset_id)
            .finish()
    }
}

impl Drop for OutputData {
    fn drop(&mut self) {
        self.blinding_factor.zeroize();
        self.secret.zeroize();
    }
}

impl OutputData {
    /// Blinded message to send to the mint
    pub fn blinded(&self) -> Result<BlindedMessage, Error> {
        let amount = self
            .amount
            .ok_or_else(|| Error::Protocol("output has no amount".to_string()))?;
        Ok(BlindedMessage {
            amount,
            keyset_id: self.keyset_id.clone(),
            blinded_secret: self.blinded_message.clone(),
        })
    }

    /// Form that can be stored until change is collected
    pub fn to_serialized(&self) -> SerializedOutputData {
        SerializedOutputData {
            blinded_message: self.blinded_message.clone(),
            blinding_factor: self.blinding_factor.clone(),
            secret: self.secret.to_lower_hex_string(),
            amount: self.amount,
            keyset_id: self.keyset_id.clone(),
        }
    }
}

/// Serializable [`OutputData`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedOutputData {
    /// Blinded message, hex
    pub blinded_message: String,
    /// Blinding factor, hex
    pub blinding_factor: String,
    /// Secret, hex
    pub secret: String,
    /// Amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    /// Keyset id
    pub keyset_id: String,
}

impl fmt::Debug for SerializedOutputData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedOutputData")
            .field("blinded_message", &self.blinded_message)
            .field("amount", &self.amount)
            .field("keyset_id", &self.keyset_id)
            .finish_non_exhaustive()
    }
}

impl Drop for SerializedOutputData {
    fn drop(&mut self) {
        self.blinding_factor.zeroize();
        self.secret.zeroize();
    }
}

impl TryFrom<SerializedOutputData> for OutputData {
    type Error = Error;

    fn try_from(data: SerializedOutputData) -> Result<Self, Self::Error> {
        let secret = Vec::<u8>::from_hex(&data.secret)
            .map_err(|e| Error::Protocol(format!("invalid output secret: {e}")))?;
        Ok(OutputData {
            blinded_message: data.blinded_message.clone(),
            blinding_factor: data.blinding_factor.clone(),
            secret,
            amount: data.amount,
            keyset_id: data.keyset_id.clone(),
        })
    }
}

/// Blind signature primitive
///
/// Implementations own the elliptic curve math. Outputs may leave
/// `amount` unset, in which case the caller assigns the power of two split.
#[async_trait]
pub trait BlindingEngine: fmt::Debug + Send + Sync {
    /// Create blinded outputs worth `amount` against `keyset`
    async fn create_outputs(&self, amount: Amount, keyset: &Keyset)
        -> Result<Vec<OutputData>, Error>;

    /// Unblind `signature` into a proof
    async fn to_proof(
        &self,
        signature: &BlindSignature,
        output: &OutputData,
        keyset: &Keyset,
    ) -> Result<Proof, Error>;

    /// Hash-to-curve point `Y` of a secret, hex
    ///
    /// `None` if the engine cannot compute it.
    fn y(&self, _secret: &str) -> Option<String> {
        None
    }
}

/// Outputs ready to post and the secrets needed to unblind them
#[derive(Debug, Default)]
pub struct BlindedOutputs {
    /// Blinded messages for the mint
    pub outputs: Vec<BlindedMessage>,
    /// Matching secret material
    pub output_datas: Vec<OutputData>,
}

/// Create outputs worth `amount` against the selected keyset of `keys`
#[tracing::instrument(skip(engine, keys))]
pub async fn create_blinded_outputs(
    engine: &dyn BlindingEngine,
    amount: Amount,
    keys: &MintKeys,
) -> Result<BlindedOutputs, Error> {
    if amount == Amount::ZERO {
        return Err(Error::Validation("Amount must be positive".to_string()));
    }

    let keyset = keys
        .resolve()
        .map_err(|e| Error::Protocol(format!("keyset resolution failed: {e}")))?;

    let mut output_datas = engine.create_outputs(amount, keyset).await?;

    if output_datas.iter().all(|o| o.amount.is_some()) {
        let total = Amount::try_sum(output_datas.iter().filter_map(|o| o.amount))?;
        if total != amount {
            return Err(Error::Protocol(format!(
                "amount mismatch: outputs carry {total}, expected {amount}"
            )));
        }
    } else {
        let split = amount.split();
        if split.len() != output_datas.len() {
            return Err(Error::Protocol(format!(
                "amount mismatch: {} outputs for {} denominations",
                output_datas.len(),
                split.len()
            )));
        }
        for (output, part) in output_datas.iter_mut().zip(split) {
            output.amount = Some(part);
        }
    }

    for output in output_datas.iter_mut() {
        if output.keyset_id.is_empty() {
            output.keyset_id = keyset.id.clone();
        }
    }

    let outputs = output_datas
        .iter()
        .map(OutputData::blinded)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!("Created {} blinded outputs", outputs.len());

    Ok(BlindedOutputs {
        outputs,
        output_datas,
    })
}

/// Unblind signatures paired positionally with `output_datas`
#[tracing::instrument(skip_all)]
pub async fn signatures_to_proofs(
    engine: &dyn BlindingEngine,
    signatures: &[BlindSignature],
    keys: &MintKeys,
    output_datas: &[OutputData],
) -> Result<Vec<Proof>, Error> {
    if signatures.len() != output_datas.len() {
        return Err(Error::Protocol(format!(
            "signature/output count mismatch: {} signatures for {} outputs",
            signatures.len(),
            output_datas.len()
        )));
    }

    let mut proofs = Vec::with_capacity(signatures.len());
    for (signature, output) in signatures.iter().zip(output_datas) {
        let keyset_id = if signature.keyset_id.is_empty() {
            output.keyset_id.as_str()
        } else {
            signature.keyset_id.as_str()
        };
        let keyset = match keys.keyset(keyset_id) {
            Some(keyset) => keyset,
            None => keys
                .resolve()
                .map_err(|e| Error::Protocol(format!("keyset resolution failed: {e}")))?,
        };

        let mut proof = engine.to_proof(signature, output, keyset).await?;
        if proof.keyset_id.is_empty() {
            proof.keyset_id = keyset_id.to_string();
        }
        if proof.amount == Amount::ZERO {
            proof.amount = output.amount.unwrap_or(signature.amount);
        }
        proofs.push(proof);
    }

    Ok(proofs)
}

/// [`BlindingEngine`] over secp256k1 using the `cashu` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SecpBlindingEngine;

static SECP_ENGINE: Lazy<Arc<SecpBlindingEngine>> = Lazy::new(|| Arc::new(SecpBlindingEngine));

/// Process wide engine, created on first use
pub fn default_engine() -> Arc<dyn BlindingEngine> {
    SECP_ENGINE.clone()
}

fn dhke_error<E: fmt::Display>(err: E) -> Error {
    Error::Protocol(err.to_string())
}

#[async_trait]
impl BlindingEngine for SecpBlindingEngine {
    async fn create_outputs(
        &self,
        amount: Amount,
        keyset: &Keyset,
    ) -> Result<Vec<OutputData>, Error> {
        amount
            .split()
            .into_iter()
            .map(|part| {
                let secret = rand::random::<[u8; 32]>().to_lower_hex_string().into_bytes();
                let (blinded, r) = blind_message(&secret, None).map_err(dhke_error)?;
                Ok(OutputData {
                    blinded_message: blinded.to_hex(),
                    blinding_factor: r.to_secret_hex(),
                    secret,
                    amount: Some(part),
                    keyset_id: keyset.id.clone(),
                })
            })
            .collect()
    }

    async fn to_proof(
        &self,
        signature: &BlindSignature,
        output: &OutputData,
        keyset: &Keyset,
    ) -> Result<Proof, Error> {
        let mint_key = keyset.amount_key(signature.amount).ok_or_else(|| {
            Error::Protocol(format!(
                "keyset {} has no key for amount {}",
                keyset.id, signature.amount
            ))
        })?;

        let blinded_signature = PublicKey::from_hex(&signature.c).map_err(dhke_error)?;
        let r = SecretKey::from_hex(&output.blinding_factor).map_err(dhke_error)?;
        let mint_key = PublicKey::from_hex(mint_key).map_err(dhke_error)?;

        let c = unblind_message(&blinded_signature, &r, &mint_key).map_err(dhke_error)?;

        let secret = String::from_utf8(output.secret.clone())
            .map_err(|_| Error::Protocol("output secret is not utf-8".to_string()))?;

        let keyset_id = if signature.keyset_id.is_empty() {
            output.keyset_id.clone()
        } else {
            signature.keyset_id.clone()
        };

        let mut proof = Proof::new(signature.amount, keyset_id, secret, c.to_hex());
        proof.dleq = signature.dleq.as_ref().map(|dleq| ProofDleq {
            e: dleq.e.clone(),
            s: dleq.s.clone(),
            r: output.blinding_factor.clone(),
        });
        Ok(proof)
    }

    fn y(&self, secret: &str) -> Option<String> {
        hash_to_curve(secret.as_bytes()).ok().map(|y| y.to_hex())
    }
}

//! Proof state checks and mint probes

use std::time::Duration;

use kiosk_cashu::nuts::{CheckStateRequest, Proof, ProofsMethods, State};
use kiosk_cashu::MintUrl;
use serde::Serialize;

use crate::blinding::BlindingEngine;
use crate::mint_connector::MintConnector;
use crate::Error;

/// Bound on the mint info and keys probes
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Proofs split by state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpentCheck {
    /// Proofs the mint reports as spent
    pub spent: Vec<Proof>,
    /// Every other proof, including unknown and pending ones
    pub unspent: Vec<Proof>,
}

/// Result of probing a mint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MintAvailability {
    /// Mint answered
    pub available: bool,
    /// Name from the info endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description from the info endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Version from the info endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Why the mint is unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// State of each proof, in input order
///
/// Asks `/v1/checkstate` with the hash-to-curve points when the engine can
/// compute them and falls back to posting the proofs to `/v1/check`.
#[tracing::instrument(skip_all, fields(mint_url = %mint_url, count = proofs.len()))]
pub async fn check_proofs_state(
    connector: &dyn MintConnector,
    engine: &dyn BlindingEngine,
    mint_url: &MintUrl,
    proofs: &[Proof],
) -> Result<Vec<Option<State>>, Error> {
    if proofs.is_empty() {
        return Ok(Vec::new());
    }

    let secrets: Vec<String> = proofs.iter().map(|p| p.secret.clone()).collect();
    let ys: Option<Vec<String>> = secrets.iter().map(|s| engine.y(s)).collect();

    if let Some(ys) = ys {
        let request = CheckStateRequest::Ys { ys: ys.clone() };
        match connector.post_check_state(mint_url, request).await {
            Ok(response) => return Ok(response.normalize(&secrets, Some(&ys))),
            Err(err) => tracing::debug!("checkstate failed, trying legacy check: {}", err),
        }
    }

    let request = CheckStateRequest::Proofs {
        proofs: proofs.without_mint_url(),
    };
    let response = connector.post_check_state(mint_url, request).await?;
    Ok(response.normalize(&secrets, None))
}

/// Split `proofs` into spent and unspent
///
/// A state the mint did not report counts as unspent.
pub async fn remove_spent_proofs(
    connector: &dyn MintConnector,
    engine: &dyn BlindingEngine,
    mint_url: &MintUrl,
    proofs: &[Proof],
) -> Result<SpentCheck, Error> {
    let states = check_proofs_state(connector, engine, mint_url, proofs).await?;

    let mut check = SpentCheck::default();
    for (index, proof) in proofs.iter().enumerate() {
        match states.get(index).copied().flatten() {
            Some(State::Spent) => check.spent.push(proof.clone()),
            _ => check.unspent.push(proof.clone()),
        }
    }

    tracing::debug!(
        "State check: {} spent, {} unspent",
        check.spent.len(),
        check.unspent.len()
    );

    Ok(check)
}

/// Probe a mint, info endpoint first then keys
pub async fn check_mint_availability(
    connector: &dyn MintConnector,
    mint_url: &MintUrl,
    timeout: Duration,
) -> MintAvailability {
    match tokio::time::timeout(timeout, connector.get_mint_info(mint_url)).await {
        Ok(Ok(info)) => {
            return MintAvailability {
                available: true,
                name: info.name,
                description: info.description,
                version: info.version,
                error: None,
            }
        }
        Ok(Err(err)) => tracing::warn!("Mint info probe failed for {}: {}", mint_url, err),
        Err(_) => tracing::warn!("Mint info probe timed out for {}", mint_url),
    }

    match tokio::time::timeout(timeout, connector.get_mint_keys(mint_url)).await {
        Ok(Ok(_)) => MintAvailability {
            available: true,
            ..Default::default()
        },
        Ok(Err(err)) => MintAvailability {
            available: false,
            error: Some(err.to_string()),
            ..Default::default()
        },
        Err(_) => MintAvailability {
            available: false,
            error: Some(format!("mint did not answer within {}s", timeout.as_secs())),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use kiosk_cashu::nuts::{CheckStateResponse, MintInfo};

    use super::*;
    use crate::test_utils::{test_keys, test_proof, FakeBlindingEngine, MockMintConnector};

    fn mint() -> MintUrl {
        "https://mint.example.com".parse().unwrap()
    }

    #[tokio::test]
    async fn test_remove_spent_proofs_splits_by_state() {
        let connector = MockMintConnector::new();
        connector.push_check_state_response(Ok(CheckStateResponse::Spendable {
            spendable: vec![false, true],
            pending: vec![],
        }));

        let p0 = test_proof(4, "p0");
        let p1 = test_proof(2, "p1");
        let check = remove_spent_proofs(
            &connector,
            &FakeBlindingEngine::default(),
            &mint(),
            &[p0.clone(), p1.clone()],
        )
        .await
        .unwrap();

        assert_eq!(check.spent, vec![p0]);
        assert_eq!(check.unspent, vec![p1]);
    }

    #[tokio::test]
    async fn test_check_falls_back_to_legacy_endpoint() {
        let connector = MockMintConnector::new();
        connector.push_check_state_response(Err(Error::HttpError(Some(404), "Not Found".into())));
        connector.push_check_state_response(Ok(CheckStateResponse::StateMap {
            states: [("b".to_string(), "SPENT".to_string())].into_iter().collect(),
        }));

        let states = check_proofs_state(
            &connector,
            &FakeBlindingEngine::default(),
            &mint(),
            &[test_proof(1, "a"), test_proof(1, "b")],
        )
        .await
        .unwrap();
        assert_eq!(states, vec![None, Some(State::Spent)]);

        let requests = connector.check_state_requests();
        assert!(matches!(requests[0], CheckStateRequest::Ys { .. }));
        match &requests[1] {
            CheckStateRequest::Proofs { proofs } => {
                assert!(proofs.iter().all(|p| p.mint_url.is_none()))
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_state_is_unspent() {
        let connector = MockMintConnector::new();
        connector.push_check_state_response(Ok(CheckStateResponse::StateList { states: vec![] }));

        let proofs = vec![test_proof(1, "a")];
        let check = remove_spent_proofs(&connector, &FakeBlindingEngine::default(), &mint(), &proofs)
            .await
            .unwrap();
        assert!(check.spent.is_empty());
        assert_eq!(check.unspent, proofs);
    }

    #[tokio::test]
    async fn test_mint_availability_uses_info() {
        let connector = MockMintConnector::new();
        connector.set_mint_info(Ok(MintInfo {
            name: Some("Test Mint".to_string()),
            version: Some("nutshell/0.16".to_string()),
            ..Default::default()
        }));

        let availability = check_mint_availability(&connector, &mint(), PROBE_TIMEOUT).await;
        assert!(availability.available);
        assert_eq!(availability.name.as_deref(), Some("Test Mint"));
    }

    #[tokio::test]
    async fn test_mint_availability_falls_back_to_keys() {
        let connector = MockMintConnector::new();
        connector.set_mint_info(Err(Error::HttpError(Some(500), "boom".into())));
        connector.set_mint_keys(Ok(test_keys()));

        let availability = check_mint_availability(&connector, &mint(), PROBE_TIMEOUT).await;
        assert!(availability.available);
        assert!(availability.name.is_none());

        connector.set_mint_info(Err(Error::HttpError(Some(500), "boom".into())));
        connector.set_mint_keys(Err(Error::HttpError(Some(502), "down".into())));
        let availability = check_mint_availability(&connector, &mint(), PROBE_TIMEOUT).await;
        assert!(!availability.available);
        assert!(availability.error.is_some());
    }
}

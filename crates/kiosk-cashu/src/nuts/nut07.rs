//! NUT-07: Token state check
//!
//! <https://github.com/cashubtc/nuts/blob/main/07.md>
//!
//! Mints answer in one of several shapes. [`CheckStateResponse`] decodes
//! them as an untagged union tried in a fixed order, each variant with its
//! own normalizer.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::nut00::Proofs;

/// NUT07 Error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Unknown state string
    #[error("Unknown state: {0}")]
    UnknownState(String),
}

/// Proof state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    /// Spent
    Spent,
    /// Unspent
    Unspent,
    /// Pending
    Pending,
}

impl FromStr for State {
    type Err = Error;

    fn from_str(state: &str) -> Result<Self, Self::Err> {
        match state.trim().to_ascii_uppercase().as_str() {
            "SPENT" => Ok(Self::Spent),
            "UNSPENT" => Ok(Self::Unspent),
            "PENDING" => Ok(Self::Pending),
            _ => Err(Error::UnknownState(state.to_string())),
        }
    }
}

/// Check state request [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckStateRequest {
    /// Current form, hash-to-curve points of the secrets
    Ys {
        /// Y's of the proofs to check
        #[serde(rename = "Ys")]
        ys: Vec<String>,
    },
    /// Legacy form posting the proofs themselves
    Proofs {
        /// Proofs to check
        proofs: Proofs,
    },
}

/// Entry of a positional `states` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateEntry {
    /// Bare state string
    Text(String),
    /// `{"Y": .., "state": .., "witness": ..}`
    Object {
        /// Y of proof
        #[serde(rename = "Y", default)]
        y: Option<String>,
        /// State of proof
        state: String,
    },
}

impl StateEntry {
    fn state(&self) -> Option<State> {
        match self {
            Self::Text(state) | Self::Object { state, .. } => State::from_str(state).ok(),
        }
    }
}

/// Check state response [NUT-07]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckStateResponse {
    /// `{"spendable": [bool], "pending": [bool]?}`
    Spendable {
        /// Spendable flag per proof
        spendable: Vec<bool>,
        /// Pending flag per proof
        #[serde(default)]
        pending: Vec<bool>,
    },
    /// `{"states": [state | {Y, state}]}`
    StateList {
        /// State per proof
        states: Vec<StateEntry>,
    },
    /// `{"states": {secret: state}}`
    StateMap {
        /// State keyed by secret or Y
        states: HashMap<String, String>,
    },
}

impl CheckStateResponse {
    /// State per input proof, `None` where the mint gave no usable answer
    ///
    /// `ys` are the hash-to-curve points in proof order, when the request
    /// used them.
    pub fn normalize(&self, secrets: &[String], ys: Option<&[String]>) -> Vec<Option<State>> {
        match self {
            Self::Spendable { spendable, pending } => normalize_spendable(spendable, pending, secrets.len()),
            Self::StateList { states } => normalize_state_list(states, secrets.len(), ys),
            Self::StateMap { states } => normalize_state_map(states, secrets, ys),
        }
    }
}

fn normalize_spendable(spendable: &[bool], pending: &[bool], count: usize) -> Vec<Option<State>> {
    (0..count)
        .map(|i| {
            if pending.get(i).copied().unwrap_or(false) {
                return Some(State::Pending);
            }
            spendable.get(i).map(|s| match s {
                true => State::Unspent,
                false => State::Spent,
            })
        })
        .collect()
}

fn normalize_state_list(
    states: &[StateEntry],
    count: usize,
    ys: Option<&[String]>,
) -> Vec<Option<State>> {
    let keyed_by_y = ys.is_some()
        && states
            .iter()
            .all(|s| matches!(s, StateEntry::Object { y: Some(_), .. }));

    (0..count)
        .map(|i| {
            if keyed_by_y {
                let y = ys.and_then(|ys| ys.get(i))?;
                states
                    .iter()
                    .find(|s| matches!(s, StateEntry::Object { y: Some(entry_y), .. } if entry_y.eq_ignore_ascii_case(y)))
                    .and_then(StateEntry::state)
            } else {
                states.get(i).and_then(StateEntry::state)
            }
        })
        .collect()
}

fn normalize_state_map(
    states: &HashMap<String, String>,
    secrets: &[String],
    ys: Option<&[String]>,
) -> Vec<Option<State>> {
    secrets
        .iter()
        .enumerate()
        .map(|(i, secret)| {
            states
                .get(secret)
                .or_else(|| ys.and_then(|ys| ys.get(i)).and_then(|y| states.get(y)))
                .and_then(|state| State::from_str(state).ok())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> Vec<String> {
        vec!["s0".to_string(), "s1".to_string(), "s2".to_string()]
    }

    #[test]
    fn test_spendable_shape() {
        let response: CheckStateResponse =
            serde_json::from_str(r#"{"spendable":[false,true,true],"pending":[false,false,true]}"#)
                .unwrap();
        assert_eq!(
            response.normalize(&secrets(), None),
            vec![Some(State::Spent), Some(State::Unspent), Some(State::Pending)]
        );
    }

    #[test]
    fn test_state_list_shape() {
        let response: CheckStateResponse =
            serde_json::from_str(r#"{"states":["SPENT","unspent"]}"#).unwrap();
        assert_eq!(
            response.normalize(&secrets(), None),
            vec![Some(State::Spent), Some(State::Unspent), None]
        );
    }

    #[test]
    fn test_nut07_objects_matched_by_y() {
        let response: CheckStateResponse = serde_json::from_str(
            r#"{"states":[
                {"Y":"02bb","state":"UNSPENT","witness":null},
                {"Y":"02aa","state":"SPENT","witness":null}
            ]}"#,
        )
        .unwrap();
        let ys = vec!["02AA".to_string(), "02bb".to_string()];
        assert_eq!(
            response.normalize(&secrets()[..2], Some(&ys)),
            vec![Some(State::Spent), Some(State::Unspent)]
        );
    }

    #[test]
    fn test_state_map_shape() {
        let response: CheckStateResponse =
            serde_json::from_str(r#"{"states":{"s1":"SPENT","s0":"bogus"}}"#).unwrap();
        assert_eq!(
            response.normalize(&secrets(), None),
            vec![None, Some(State::Spent), None]
        );
    }

    #[test]
    fn test_unrecognized_shape() {
        assert!(serde_json::from_str::<CheckStateResponse>(r#"{"result":"ok"}"#).is_err());
    }

    #[test]
    fn test_request_serialization() {
        let request = CheckStateRequest::Ys {
            ys: vec!["02aa".to_string()],
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({"Ys": ["02aa"]})
        );
    }
}

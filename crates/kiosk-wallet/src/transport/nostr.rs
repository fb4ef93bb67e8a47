//! Nostr transport
//!
//! Sends the payload as a NIP-04 encrypted direct message (kind 4) to the
//! `nprofile` of the request, signed by a keypair generated for this send
//! only. Relays are tried in order and the first acknowledgement wins.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kiosk_cashu::nuts::{PaymentRequestPayload, Transport, TransportType};
use nostr_sdk::nips::nip04;
use nostr_sdk::nips::nip19::Nip19Profile;
use nostr_sdk::{Client as NostrClient, Event, EventBuilder, FromBech32, Keys, Kind, Tag};

use super::{Delivery, PaymentTransport};
use crate::Error;

/// Relays used when neither the profile nor the configuration names any
pub const DEFAULT_RELAYS: [&str; 3] = [
    "wss://relay.damus.io",
    "wss://relay.primal.net",
    "wss://relay.snort.social",
];

/// Relay connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Publish acknowledgement timeout
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(6);

const DIRECT_MESSAGE_KIND: u16 = 4;

/// Publishes a signed event to one relay
#[async_trait]
pub trait RelayPublisher: Debug + Send + Sync {
    /// Publish `event` to `relay`, `Ok` once the relay acknowledged it
    async fn publish(&self, relay: &str, event: &Event) -> Result<(), Error>;
}

/// [`RelayPublisher`] backed by a short lived `nostr-sdk` client per relay
#[derive(Debug, Clone, Copy)]
pub struct NostrSdkPublisher {
    connect_timeout: Duration,
    publish_timeout: Duration,
}

impl Default for NostrSdkPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_PUBLISH_TIMEOUT)
    }
}

impl NostrSdkPublisher {
    /// Create new [`NostrSdkPublisher`]
    pub fn new(connect_timeout: Duration, publish_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            publish_timeout,
        }
    }
}

#[async_trait]
impl RelayPublisher for NostrSdkPublisher {
    async fn publish(&self, relay: &str, event: &Event) -> Result<(), Error> {
        let client = NostrClient::default();

        let connect = async {
            client
                .add_write_relay(relay)
                .await
                .map_err(|e| Error::Transport(format!("Add relay {relay}: {e}")))?;
            client.connect().await;
            Ok::<(), Error>(())
        };
        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| Error::Transport(format!("Connect to {relay} timed out")))??;

        let published = tokio::time::timeout(self.publish_timeout, client.send_event(event)).await;
        client.disconnect().await;

        let output = published
            .map_err(|_| Error::Transport(format!("Publish to {relay} timed out")))?
            .map_err(|e| Error::Transport(format!("Publish to {relay}: {e}")))?;

        if output.success.is_empty() {
            let reason = output
                .failed
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| "no acknowledgement".to_string());
            return Err(Error::Transport(format!("Relay {relay} rejected event: {reason}")));
        }

        Ok(())
    }
}

/// Payment transport over nostr direct messages
#[derive(Debug, Clone)]
pub struct NostrTransport {
    publisher: Arc<dyn RelayPublisher>,
    relays: Vec<String>,
}

impl NostrTransport {
    /// Create new [`NostrTransport`]
    ///
    /// `relays` are used when the recipient profile lists none.
    pub fn new(publisher: Arc<dyn RelayPublisher>, relays: Vec<String>) -> Self {
        Self { publisher, relays }
    }

    fn candidate_relays(&self, profile: &Nip19Profile) -> Vec<String> {
        if !profile.relays.is_empty() {
            return profile.relays.iter().map(|r| r.to_string()).collect();
        }
        if !self.relays.is_empty() {
            return self.relays.clone();
        }
        DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect()
    }
}

/// Encrypted kind 4 event carrying `payload` to `profile`
pub fn direct_message_event(
    keys: &Keys,
    profile: &Nip19Profile,
    payload: &PaymentRequestPayload,
) -> Result<Event, Error> {
    let content = serde_json::to_string(payload)?;
    let encrypted = nip04::encrypt(keys.secret_key(), &profile.public_key, content)
        .map_err(|e| Error::Transport(format!("Encrypt payload: {e}")))?;

    EventBuilder::new(Kind::from_u16(DIRECT_MESSAGE_KIND), encrypted)
        .tag(Tag::public_key(profile.public_key))
        .sign_with_keys(keys)
        .map_err(|e| Error::Transport(format!("Sign event: {e}")))
}

#[async_trait]
impl PaymentTransport for NostrTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::Nostr
    }

    #[tracing::instrument(skip_all)]
    async fn deliver(
        &self,
        target: &Transport,
        payload: &PaymentRequestPayload,
    ) -> Result<Delivery, Error> {
        let profile = Nip19Profile::from_bech32(&target.target)
            .map_err(|e| Error::Transport(format!("Invalid nprofile: {e}")))?;

        let keys = Keys::generate();
        let event = direct_message_event(&keys, &profile, payload)?;

        let mut last_error = None;
        for relay in self.candidate_relays(&profile) {
            match self.publisher.publish(&relay, &event).await {
                Ok(()) => {
                    tracing::debug!("Relay {} acknowledged event {}", relay, event.id);
                    return Ok(Delivery::Nostr {
                        relay,
                        event_id: event.id.to_hex(),
                    });
                }
                Err(err) => {
                    tracing::warn!("Relay {} failed: {}", relay, err);
                    last_error = Some(err);
                }
            }
        }

        Err(match last_error {
            Some(Error::Transport(message)) => Error::Transport(message),
            Some(err) => Error::Transport(err.to_string()),
            None => Error::Transport("No relays available".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use kiosk_cashu::Amount;
    use nostr_sdk::nips::nip19::ToBech32;
    use nostr_sdk::RelayUrl;

    use super::*;
    use crate::test_utils::{test_proof, FakeRelayPublisher};

    fn payload() -> PaymentRequestPayload {
        PaymentRequestPayload {
            id: Some("b7a90176".to_string()),
            amount: Some(Amount::from(2)),
            memo: None,
            mint: "https://mint.example.com".to_string(),
            unit: "sat".to_string(),
            proofs: vec![test_proof(2, "a")],
        }
    }

    fn target(keys: &Keys, relays: &[&str]) -> Transport {
        let relays: Vec<RelayUrl> = relays.iter().map(|r| RelayUrl::parse(r).unwrap()).collect();
        let nprofile = Nip19Profile::new(keys.public_key(), relays)
            .to_bech32()
            .unwrap();
        Transport::builder()
            .transport_type(TransportType::Nostr)
            .target(nprofile)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_ack_wins() {
        let recipient = Keys::generate();
        let publisher = Arc::new(FakeRelayPublisher::failing(&["wss://relay.one"]));
        let transport = NostrTransport::new(publisher.clone(), vec![]);

        let delivery = transport
            .deliver(
                &target(&recipient, &["wss://relay.one", "wss://relay.two", "wss://relay.three"]),
                &payload(),
            )
            .await
            .unwrap();

        match delivery {
            Delivery::Nostr { relay, .. } => assert_eq!(relay.trim_end_matches('/'), "wss://relay.two"),
            other => panic!("unexpected delivery {other:?}"),
        }
        assert_eq!(publisher.attempts(), vec!["wss://relay.one", "wss://relay.two"]);

        let event = publisher.events().pop().unwrap();
        assert_eq!(event.kind, Kind::from_u16(4));
        assert_ne!(event.pubkey, recipient.public_key());
        let decrypted = nip04::decrypt(recipient.secret_key(), &event.pubkey, &event.content).unwrap();
        let received: PaymentRequestPayload = serde_json::from_str(&decrypted).unwrap();
        assert_eq!(received, payload());
    }

    #[tokio::test]
    async fn test_fallback_relays_and_exhaustion() {
        let recipient = Keys::generate();
        let publisher = Arc::new(FakeRelayPublisher::failing(&DEFAULT_RELAYS));
        let transport = NostrTransport::new(publisher.clone(), vec![]);

        let err = transport
            .deliver(&target(&recipient, &[]), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m.contains("relay.snort.social")));
        assert_eq!(publisher.attempts().len(), 3);

        let publisher = Arc::new(FakeRelayPublisher::failing(&[]));
        let transport =
            NostrTransport::new(publisher.clone(), vec!["wss://configured.relay".to_string()]);
        transport
            .deliver(&target(&recipient, &[]), &payload())
            .await
            .unwrap();
        assert_eq!(publisher.attempts(), vec!["wss://configured.relay"]);
    }

    #[tokio::test]
    async fn test_fresh_keys_per_send() {
        let recipient = Keys::generate();
        let publisher = Arc::new(FakeRelayPublisher::failing(&[]));
        let transport = NostrTransport::new(publisher.clone(), vec![]);
        let target = target(&recipient, &["wss://relay.one"]);

        transport.deliver(&target, &payload()).await.unwrap();
        transport.deliver(&target, &payload()).await.unwrap();

        let events = publisher.events();
        assert_ne!(events[0].pubkey, events[1].pubkey);
    }

    #[tokio::test]
    async fn test_invalid_nprofile() {
        let transport = NostrTransport::new(Arc::new(FakeRelayPublisher::failing(&[])), vec![]);
        let target = Transport::builder()
            .transport_type(TransportType::Nostr)
            .target("npub-not-really")
            .build()
            .unwrap();

        let err = transport.deliver(&target, &payload()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}

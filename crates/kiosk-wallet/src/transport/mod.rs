//! Delivery of NUT-18 payment payloads

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use kiosk_cashu::nuts::{PaymentRequest, PaymentRequestPayload, Transport, TransportType};

use crate::Error;

pub mod http;
pub mod nostr;

pub use http::HttpPostTransport;
pub use nostr::{NostrSdkPublisher, NostrTransport, RelayPublisher};

/// Order in which request transports are tried
pub const TRANSPORT_PREFERENCE: [TransportType; 2] = [TransportType::HttpPost, TransportType::Nostr];

/// Where a payload ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Posted over http
    HttpPost {
        /// Target url
        url: String,
        /// Response status
        status: u16,
    },
    /// Published as an encrypted direct message
    Nostr {
        /// Relay that acknowledged the event
        relay: String,
        /// Event id, hex
        event_id: String,
    },
}

/// Sends a payment payload over one transport type
#[async_trait]
pub trait PaymentTransport: Debug + Send + Sync {
    /// Transport type handled
    fn transport_type(&self) -> TransportType;

    /// Deliver `payload` to `target`
    async fn deliver(
        &self,
        target: &Transport,
        payload: &PaymentRequestPayload,
    ) -> Result<Delivery, Error>;
}

/// Transport of `request` to use and the sender for it
///
/// Returns `None` when the request offers nothing the wallet can send over.
pub fn select_transport<'a>(
    request: &'a PaymentRequest,
    senders: &'a [Arc<dyn PaymentTransport>],
) -> Option<(&'a Transport, &'a Arc<dyn PaymentTransport>)> {
    TRANSPORT_PREFERENCE.iter().find_map(|transport_type| {
        let target = request.transport(*transport_type)?;
        let sender = senders
            .iter()
            .find(|s| s.transport_type() == *transport_type)?;
        Some((target, sender))
    })
}

//! NUT-18: Payment Requests
//!
//! <https://github.com/cashubtc/nuts/blob/main/18.md>

pub mod error;
pub mod payment_request;
pub mod transport;

pub use error::Error;
pub use payment_request::{
    create_payment_request, parse_payment_request, PaymentRequest, PaymentRequestBuilder,
    PaymentRequestParams, PaymentRequestPayload,
};
pub use transport::{Transport, TransportBuilder, TransportType};

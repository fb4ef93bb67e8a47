//! Classification of pasted or scanned input

use kiosk_cashu::nuts::PaymentRequest;
use kiosk_cashu::parse_payment_request;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::Error;

const REQUEST_PREFIX: &str = "creqa";
const BOLT11_PREFIXES: [&str; 3] = ["lnbcrt", "lntb", "lnbc"];
const URI_SCHEMES: [&str; 2] = ["lightning:", "bitcoin:"];

static LIGHTNING_ADDRESS: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$"));

/// What a send is paying
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendInput {
    /// NUT-18 payment request
    PaymentRequest(PaymentRequest),
    /// BOLT11 invoice, lowercase without uri scheme
    Bolt11(String),
    /// Lightning address or LNURL
    LightningAddress(String),
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    if text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn strip_uri_scheme(text: &str) -> &str {
    let text = text.trim();
    URI_SCHEMES
        .iter()
        .find_map(|scheme| strip_prefix_ignore_case(text, scheme))
        .map(str::trim)
        .unwrap_or(text)
}

/// Text is a NUT-18 payment request
pub fn is_payment_request(text: &str) -> bool {
    strip_prefix_ignore_case(text.trim(), REQUEST_PREFIX).is_some()
}

/// Invoice without uri scheme, lowercase, if `text` is a BOLT11 invoice
pub fn normalize_bolt11(text: &str) -> Option<String> {
    let invoice = strip_uri_scheme(text).to_lowercase();
    BOLT11_PREFIXES
        .iter()
        .any(|prefix| invoice.starts_with(prefix))
        .then_some(invoice)
}

/// Text is a BOLT11 invoice
pub fn is_bolt11(text: &str) -> bool {
    normalize_bolt11(text).is_some()
}

/// Address without uri scheme if `text` is a lightning address or LNURL
pub fn normalize_lightning_address(text: &str) -> Option<String> {
    let address = strip_uri_scheme(text);
    if strip_prefix_ignore_case(address, "lnurl").is_some() {
        return Some(address.to_string());
    }

    match LIGHTNING_ADDRESS.as_ref() {
        Ok(re) if re.is_match(address) => Some(address.to_string()),
        Ok(_) => None,
        Err(err) => {
            tracing::error!("Lightning address pattern is invalid: {}", err);
            None
        }
    }
}

/// Text is a lightning address or LNURL
pub fn is_lightning_address(text: &str) -> bool {
    normalize_lightning_address(text).is_some()
}

/// Text looks like a cashu token
pub fn is_cashu_token(text: &str) -> bool {
    let text = text.trim();
    let text = strip_prefix_ignore_case(text, "cashu:").unwrap_or(text).trim_start();
    strip_prefix_ignore_case(text, "cashu").is_some()
}

/// Classify send input
///
/// Payment requests win over invoices, invoices over addresses.
pub fn detect_input(raw: &str) -> Result<SendInput, Error> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(Error::Validation("Input is empty".to_string()));
    }

    if is_payment_request(text) {
        return Ok(SendInput::PaymentRequest(parse_payment_request(text)?));
    }

    if let Some(invoice) = normalize_bolt11(text) {
        return Ok(SendInput::Bolt11(invoice));
    }

    if let Some(address) = normalize_lightning_address(text) {
        return Ok(SendInput::LightningAddress(address));
    }

    Err(Error::Validation("Unsupported input".to_string()))
}

#[cfg(test)]
mod tests {
    use kiosk_cashu::nuts::PaymentRequestParams;
    use kiosk_cashu::{create_payment_request, Amount};

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_detect_payment_request() {
        let encoded = create_payment_request(PaymentRequestParams {
            id: "x".to_string(),
            amount: 100.0,
            ..Default::default()
        })
        .unwrap();

        match detect_input(&format!("  {encoded} ")).unwrap() {
            SendInput::PaymentRequest(request) => {
                assert_eq!(request.payment_id.as_deref(), Some("x"));
                assert_eq!(request.amount, Some(Amount::from(100)));
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_detect_bolt11() {
        assert_eq!(
            detect_input("lightning:LNBC10U1PJQ").unwrap(),
            SendInput::Bolt11("lnbc10u1pjq".to_string())
        );
        assert_eq!(
            detect_input("bitcoin:lntb1500n1xyz").unwrap(),
            SendInput::Bolt11("lntb1500n1xyz".to_string())
        );
        assert!(is_bolt11("lnbcrt100n1abc"));
    }

    #[test]
    fn test_detect_lightning_address() {
        assert_eq!(
            detect_input("satoshi@coinos.io").unwrap(),
            SendInput::LightningAddress("satoshi@coinos.io".to_string())
        );
        assert_eq!(
            detect_input("lightning:LNURL1DP68GURN8GHJ7").unwrap(),
            SendInput::LightningAddress("LNURL1DP68GURN8GHJ7".to_string())
        );
        assert!(!is_lightning_address("satoshi@localhost"));
    }

    #[test]
    fn test_detect_rejects_other_input() {
        let err = detect_input("hello world").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = detect_input("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = detect_input("creqAnot-base64!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn test_is_cashu_token() {
        assert!(is_cashu_token("cashuBo2F0"));
        assert!(is_cashu_token("cashu:cashuAeyJ0"));
        assert!(!is_cashu_token("creqA"));
    }
}

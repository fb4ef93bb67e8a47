//! Cashu Token
//!
//! Parses `cashuA` (base64 JSON), `cashuB` (base64url CBOR) and bare JSON
//! tokens into a normalized list of proofs.
//!
//! <https://github.com/cashubtc/nuts/blob/main/00.md>

use std::fmt;
use std::str::FromStr;

use bitcoin::base64::engine::{general_purpose, DecodePaddingMode, GeneralPurpose};
use bitcoin::base64::{alphabet, Engine as _};
use bitcoin::hex::FromHex;
use serde_json::{json, Map, Value as Json};

use super::{dedup_proofs, Error, Proof, ProofDleq};
use crate::cbor::{self, Value};
use crate::Amount;

const TOKEN_PREFIX: &str = "cashu";
const URI_PREFIX: &str = "cashu:";

/// Token envelope version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenVersion {
    /// `cashuA`, base64 JSON
    A,
    /// `cashuB`, base64url CBOR
    B,
    /// Bare JSON without prefix
    Json,
}

impl fmt::Display for TokenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// Proofs from a single mint inside a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    /// Mint url
    pub mint: String,
    /// Proofs, each stamped with `mint`
    pub proofs: Vec<Proof>,
    /// Unit
    pub unit: Option<String>,
}

/// Decoded token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedToken {
    /// Entries with at least one valid proof
    pub entries: Vec<TokenEntry>,
    /// Token level unit
    pub unit: Option<String>,
    /// Memo
    pub memo: Option<String>,
    /// Envelope version
    pub version: TokenVersion,
}

impl ParsedToken {
    /// All proofs of all entries, de-duplicated
    pub fn proofs(&self) -> Vec<Proof> {
        dedup_proofs(
            self.entries
                .iter()
                .flat_map(|e| e.proofs.iter().cloned())
                .collect(),
        )
    }

    /// Sum of all proof amounts
    pub fn value(&self) -> Result<Amount, Error> {
        Ok(Amount::try_sum(self.proofs().iter().map(|p| p.amount))?)
    }
}

impl FromStr for ParsedToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_token(s)
    }
}

/// Parse a token string
pub fn parse_token(text: &str) -> Result<ParsedToken, Error> {
    let mut text = text.trim();
    if text.len() >= URI_PREFIX.len()
        && text.is_char_boundary(URI_PREFIX.len())
        && text[..URI_PREFIX.len()].eq_ignore_ascii_case(URI_PREFIX)
    {
        text = text[URI_PREFIX.len()..].trim_start();
    }

    if text.is_empty() {
        return Err(Error::InvalidTokenFormat);
    }

    if text.len() >= TOKEN_PREFIX.len()
        && text.is_char_boundary(TOKEN_PREFIX.len())
        && text[..TOKEN_PREFIX.len()].eq_ignore_ascii_case(TOKEN_PREFIX)
    {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut rest = compact[TOKEN_PREFIX.len()..].chars();
        let version = rest.next().ok_or(Error::MissingPayload)?;
        let payload = rest.as_str();
        if payload.is_empty() {
            return Err(Error::MissingPayload);
        }

        return match version {
            'A' | 'a' => {
                let json = String::from_utf8(decode_base64(payload)?)?;
                let raw: Json = serde_json::from_str(&json)?;
                Ok(parse_json_token(&raw, TokenVersion::A))
            }
            'B' | 'b' => {
                let decoded = cbor::decode(&decode_base64(payload)?)?;
                if !matches!(decoded, Value::Map(_)) {
                    return Err(Error::InvalidPayload);
                }
                Ok(parse_compact_token(&decoded.into_json()))
            }
            other => Err(Error::UnsupportedVersion(other)),
        };
    }

    if text.starts_with('{') || text.starts_with('[') {
        let raw: Json = serde_json::from_str(text)?;
        return Ok(parse_json_token(&raw, TokenVersion::Json));
    }

    Err(Error::InvalidTokenFormat)
}

/// Serialize proofs from one mint into a `cashuA` or `cashuB` token
///
/// [`TokenVersion::Json`] produces the bare JSON object.
pub fn serialize_token(
    proofs: &[Proof],
    mint: &str,
    version: TokenVersion,
    unit: Option<&str>,
    memo: Option<&str>,
) -> Result<String, Error> {
    if proofs.is_empty() {
        return Err(Error::ProofsRequired);
    }

    match version {
        TokenVersion::A | TokenVersion::Json => {
            let proofs: Vec<Json> = proofs.iter().map(proof_to_json).collect();
            let mut raw = Map::new();
            raw.insert(
                "token".to_string(),
                json!([{ "mint": mint, "proofs": proofs }]),
            );
            if let Some(unit) = unit {
                raw.insert("unit".to_string(), Json::from(unit));
            }
            if let Some(memo) = memo {
                raw.insert("memo".to_string(), Json::from(memo));
            }
            let json = serde_json::to_string(&Json::Object(raw))?;
            if version == TokenVersion::Json {
                return Ok(json);
            }
            Ok(format!(
                "{TOKEN_PREFIX}A{}",
                general_purpose::URL_SAFE.encode(json.as_bytes())
            ))
        }
        TokenVersion::B => {
            let mut groups: Vec<(&str, Vec<Value>)> = Vec::new();
            for proof in proofs {
                let compact = proof_to_compact(proof);
                match groups.iter_mut().find(|(id, _)| *id == proof.keyset_id) {
                    Some((_, list)) => list.push(compact),
                    None => groups.push((&proof.keyset_id, vec![compact])),
                }
            }

            let tokens = groups
                .into_iter()
                .map(|(id, proofs)| {
                    Value::map([("i", hex_or_text(id)), ("p", Value::Array(proofs))])
                })
                .collect();

            let mut entries = vec![
                ("m".to_string(), Value::from(mint)),
                ("u".to_string(), Value::from(unit.unwrap_or("sat"))),
            ];
            if let Some(memo) = memo {
                entries.push(("d".to_string(), Value::from(memo)));
            }
            entries.push(("t".to_string(), Value::Array(tokens)));

            let bytes = cbor::encode(&Value::Map(entries))?;
            Ok(format!(
                "{TOKEN_PREFIX}B{}",
                general_purpose::URL_SAFE_NO_PAD.encode(bytes)
            ))
        }
    }
}

/// Decode standard or url-safe base64, padded or not
pub(crate) fn decode_base64(payload: &str) -> Result<Vec<u8>, Error> {
    let normalized: String = payload
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();
    let decode_config = general_purpose::GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent);
    Ok(GeneralPurpose::new(&alphabet::URL_SAFE, decode_config).decode(normalized)?)
}

fn proof_to_json(proof: &Proof) -> Json {
    let mut map = Map::new();
    map.insert("amount".to_string(), Json::from(proof.amount.to_u64()));
    map.insert("id".to_string(), Json::from(proof.keyset_id.as_str()));
    map.insert("secret".to_string(), Json::from(proof.secret.as_str()));
    map.insert("C".to_string(), Json::from(proof.c.as_str()));
    if let Some(dleq) = &proof.dleq {
        map.insert("dleq".to_string(), json!({"e": dleq.e, "s": dleq.s, "r": dleq.r}));
    }
    Json::Object(map)
}

fn proof_to_compact(proof: &Proof) -> Value {
    let mut entries = vec![
        ("a".to_string(), Value::from(proof.amount.to_u64())),
        ("s".to_string(), Value::from(proof.secret.as_str())),
        ("c".to_string(), hex_or_text(&proof.c)),
    ];
    if let Some(dleq) = &proof.dleq {
        entries.push((
            "d".to_string(),
            Value::map([
                ("e", hex_or_text(&dleq.e)),
                ("s", hex_or_text(&dleq.s)),
                ("r", hex_or_text(&dleq.r)),
            ]),
        ));
    }
    Value::Map(entries)
}

/// Hex fields travel as byte strings in CBOR
fn hex_or_text(value: &str) -> Value {
    match Vec::<u8>::from_hex(value) {
        Ok(bytes) if !value.is_empty() => Value::Bytes(bytes),
        _ => Value::from(value),
    }
}

fn text_field<'a>(raw: &'a Json, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| raw.get(*k))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
}

fn amount_field(raw: &Json) -> Option<u64> {
    let value = raw.get("amount").or_else(|| raw.get("a"))?;
    match value {
        Json::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f > 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_dleq(raw: Option<&Json>) -> Option<ProofDleq> {
    let raw = raw?;
    Some(ProofDleq {
        e: text_field(raw, &["e"])?.to_string(),
        s: text_field(raw, &["s"])?.to_string(),
        r: text_field(raw, &["r"])?.to_string(),
    })
}

/// Normalize a proof from any of the accepted field spellings
///
/// Returns `None` unless amount is positive and the secret is non-empty.
pub fn normalize_proof(raw: &Json, fallback_id: Option<&str>) -> Option<Proof> {
    if !raw.is_object() {
        return None;
    }

    let amount = amount_field(raw).filter(|a| *a > 0)?;
    let secret = text_field(raw, &["secret", "s"])?;
    let c = text_field(raw, &["C", "c"]).unwrap_or_default();
    let keyset_id = text_field(raw, &["id", "keyset_id", "keysetId", "i"])
        .or(fallback_id)
        .unwrap_or_default();
    let mint_url = text_field(raw, &["mintUrl"]).map(str::to_string);
    let dleq = normalize_dleq(raw.get("dleq").or_else(|| raw.get("d")));

    Some(Proof {
        amount: Amount::from(amount),
        secret: secret.to_string(),
        c: c.to_string(),
        keyset_id: keyset_id.to_string(),
        mint_url,
        dleq,
    })
}

fn normalize_proof_list(raw: Option<&Json>, fallback_id: Option<&str>, mint: &str) -> Vec<Proof> {
    raw.and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| normalize_proof(item, fallback_id))
                .map(|proof| proof.with_mint_url(mint))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_json_token(raw: &Json, version: TokenVersion) -> ParsedToken {
    let token_unit = text_field(raw, &["unit"]).map(str::to_string);
    let memo = text_field(raw, &["memo"]).map(str::to_string);

    let token_array = match raw {
        Json::Array(items) => Some(items),
        _ => raw
            .get("token")
            .and_then(Json::as_array)
            .or_else(|| raw.get("tokens").and_then(Json::as_array)),
    };

    let entries = token_array
        .map(|items| {
            items
                .iter()
                .filter_map(|entry| {
                    let mint = text_field(entry, &["mint", "m"])?;
                    let proofs = normalize_proof_list(
                        entry.get("proofs").or_else(|| entry.get("p")),
                        text_field(entry, &["id"]),
                        mint,
                    );
                    if proofs.is_empty() {
                        tracing::debug!("Skipping token entry for {} without valid proofs", mint);
                        return None;
                    }
                    Some(TokenEntry {
                        mint: mint.to_string(),
                        proofs,
                        unit: text_field(entry, &["unit"])
                            .map(str::to_string)
                            .or_else(|| token_unit.clone()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ParsedToken {
        entries,
        unit: token_unit,
        memo,
        version,
    }
}

fn parse_compact_token(raw: &Json) -> ParsedToken {
    let mint_fallback = text_field(raw, &["m", "mint"]);
    let token_unit = text_field(raw, &["u", "unit"]).map(str::to_string);
    let memo = text_field(raw, &["d", "memo"]).map(str::to_string);

    let mut entries: Vec<TokenEntry> = raw
        .get("t")
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|entry| {
                    let mint = text_field(entry, &["m"]).or(mint_fallback)?;
                    let proofs =
                        normalize_proof_list(entry.get("p"), text_field(entry, &["i"]), mint);
                    if proofs.is_empty() {
                        return None;
                    }
                    Some(TokenEntry {
                        mint: mint.to_string(),
                        proofs,
                        unit: text_field(entry, &["u"])
                            .map(str::to_string)
                            .or_else(|| token_unit.clone()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    if entries.is_empty() {
        if let Some(mint) = mint_fallback {
            let proofs = normalize_proof_list(raw.get("p"), text_field(raw, &["i"]), mint);
            if !proofs.is_empty() {
                entries.push(TokenEntry {
                    mint: mint.to_string(),
                    proofs,
                    unit: token_unit.clone(),
                });
            }
        }
    }

    ParsedToken {
        entries,
        unit: token_unit,
        memo,
        version: TokenVersion::B,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(amount: u64, secret: &str, c: &str) -> Proof {
        Proof::new(
            Amount::from(amount),
            "009a1f293253e41e".to_string(),
            secret.to_string(),
            c.to_string(),
        )
    }

    #[test]
    fn test_token_v4_str_round_trip() {
        let token_str = "cashuBpGF0gaJhaUgArSaMTR9YJmFwgaNhYQFhc3hAOWE2ZGJiODQ3YmQyMzJiYTc2ZGIwZGYxOTcyMTZiMjlkM2I4Y2MxNDU1M2NkMjc4MjdmYzFjYzk0MmZlZGI0ZWFjWCEDhhhUP_trhpXfStS6vN6So0qWvc2X3O4NfM-Y1HISZ5JhZGlUaGFuayB5b3VhbXVodHRwOi8vbG9jYWxob3N0OjMzMzhhdWNzYXQ=";
        let token = parse_token(token_str).unwrap();

        assert_eq!(token.version, TokenVersion::B);
        assert_eq!(token.unit.as_deref(), Some("sat"));
        assert_eq!(token.memo.as_deref(), Some("Thank you"));
        assert_eq!(token.entries.len(), 1);

        let entry = &token.entries[0];
        assert_eq!(entry.mint, "http://localhost:3338");
        assert_eq!(entry.unit.as_deref(), Some("sat"));

        let proof = &entry.proofs[0];
        assert_eq!(proof.amount, Amount::ONE);
        assert_eq!(proof.keyset_id, "00ad268c4d1f5826");
        assert_eq!(
            proof.secret,
            "9a6dbb847bd232ba76db0df197216b29d3b8cc14553cd27827fc1cc942fedb4e"
        );
        assert_eq!(
            proof.c,
            "038618543ffb6b8695df4ad4babcde92a34a96bdcd97dcee0d7ccf98d472126792"
        );
        assert_eq!(proof.mint_url.as_deref(), Some("http://localhost:3338"));

        let encoded = serialize_token(
            &token.proofs(),
            &entry.mint,
            TokenVersion::B,
            token.unit.as_deref(),
            token.memo.as_deref(),
        )
        .unwrap();
        assert_eq!(parse_token(&encoded).unwrap(), token);
    }

    #[test]
    fn test_token_v3_str_round_trip() {
        let token_str = "cashuAeyJ0b2tlbiI6W3sibWludCI6Imh0dHBzOi8vODMzMy5zcGFjZTozMzM4IiwicHJvb2ZzIjpbeyJhbW91bnQiOjIsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6IjQwNzkxNWJjMjEyYmU2MWE3N2UzZTZkMmFlYjRjNzI3OTgwYmRhNTFjZDA2YTZhZmMyOWUyODYxNzY4YTc4MzciLCJDIjoiMDJiYzkwOTc5OTdkODFhZmIyY2M3MzQ2YjVlNDM0NWE5MzQ2YmQyYTUwNmViNzk1ODU5OGE3MmYwY2Y4NTE2M2VhIn0seyJhbW91bnQiOjgsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6ImZlMTUxMDkzMTRlNjFkNzc1NmIwZjhlZTBmMjNhNjI0YWNhYTNmNGUwNDJmNjE0MzNjNzI4YzcwNTdiOTMxYmUiLCJDIjoiMDI5ZThlNTA1MGI4OTBhN2Q2YzA5NjhkYjE2YmMxZDVkNWZhMDQwZWExZGUyODRmNmVjNjlkNjEyOTlmNjcxMDU5In1dfV0sInVuaXQiOiJzYXQiLCJtZW1vIjoiVGhhbmsgeW91LiJ9";
        let token = parse_token(token_str).unwrap();

        assert_eq!(token.version, TokenVersion::A);
        assert_eq!(token.memo.as_deref(), Some("Thank you."));
        assert_eq!(token.unit.as_deref(), Some("sat"));
        assert_eq!(token.entries[0].mint, "https://8333.space:3338");
        assert_eq!(token.value().unwrap(), Amount::from(10));

        let proofs = token.proofs();
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[0].keyset_id, "009a1f293253e41e");
        assert_eq!(
            proofs[0].c,
            "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea"
        );

        let encoded = serialize_token(
            &proofs,
            "https://8333.space:3338",
            TokenVersion::A,
            Some("sat"),
            Some("Thank you."),
        )
        .unwrap();
        assert_eq!(parse_token(&encoded).unwrap(), token);
    }

    #[test]
    fn test_round_trip_both_versions() {
        let mint = "https://mint.example.com";
        let proofs = vec![
            proof(4, "secret-a", "02bc9097997d81afb2cc7346b5e4345a9346bd2a506eb7958598a72f0cf85163ea"),
            proof(1, "secret-b", "029e8e5050b890a7d6c0968db16bc1d5d5fa040ea1de284f6ec69d61299f671059"),
        ];
        let expected: Vec<Proof> = proofs
            .iter()
            .cloned()
            .map(|p| p.with_mint_url(mint))
            .collect();

        for version in [TokenVersion::A, TokenVersion::B, TokenVersion::Json] {
            let encoded = serialize_token(&proofs, mint, version, None, None).unwrap();
            let parsed = parse_token(&encoded).unwrap();
            assert_eq!(parsed.version, version);
            assert_eq!(parsed.proofs(), expected, "version {version}");
        }
    }

    #[test]
    fn test_dleq_survives_v4() {
        let mut p = proof(2, "s", "02aa");
        p.dleq = Some(ProofDleq {
            e: "0a".repeat(32),
            s: "0b".repeat(32),
            r: "0c".repeat(32),
        });
        let encoded = serialize_token(&[p.clone()], "https://m", TokenVersion::B, None, None).unwrap();
        assert_eq!(parse_token(&encoded).unwrap().proofs()[0].dleq, p.dleq);
    }

    #[test]
    fn test_uri_prefix_and_case() {
        let token = "cashuAeyJ0b2tlbiI6W3sibWludCI6Imh0dHBzOi8vODMzMy5zcGFjZTozMzM4IiwicHJvb2ZzIjpbeyJhbW91bnQiOjIsImlkIjoiMDA5YTFmMjkzMjUzZTQxZSIsInNlY3JldCI6IjQwNzkxNWJjMjEyYmU2MWE3N2UzZTZkMmFlYjRjNzI3OTgwYmRhNTFjZDA2YTZhZmMyOWUyODYxNzY4YTc4MzciLCJDIjoiMDJiYzkwOTc5OTdkODFhZmIyY2M3MzQ2YjVlNDM0NWE5MzQ2YmQyYTUwNmViNzk1ODU5OGE3MmYwY2Y4NTE2M2VhIn1dfV19";
        let with_uri = format!("  CASHU:{token}\n");
        let parsed = parse_token(&with_uri).unwrap();
        assert_eq!(parsed.proofs().len(), 1);

        let lowercase_version = token.replacen("cashuA", "cashua", 1);
        assert!(parse_token(&lowercase_version).is_ok());
    }

    #[test]
    fn test_bare_json_aliases() {
        let raw = r#"{"tokens":[
            {"m":"https://mint.example.com","id":"00ffd48b8f5ecf80","p":[
                {"a":8,"s":"one","c":"02aa"},
                {"amount":"2","secret":"two","C":"02bb","keyset_id":"00aa"},
                {"amount":0,"secret":"zero"},
                {"amount":4,"secret":""}
            ]},
            {"mint":"https://skipped.example.com","proofs":"not an array"},
            {"proofs":[{"amount":1,"secret":"no-mint"}]}
        ],"unit":"sat","memo":"hi"}"#;

        let token = parse_token(raw).unwrap();
        assert_eq!(token.version, TokenVersion::Json);
        assert_eq!(token.memo.as_deref(), Some("hi"));
        assert_eq!(token.entries.len(), 1);

        let proofs = &token.entries[0].proofs;
        assert_eq!(proofs.len(), 2);
        assert_eq!(proofs[0].keyset_id, "00ffd48b8f5ecf80");
        assert_eq!(proofs[0].c, "02aa");
        assert_eq!(proofs[1].amount, Amount::from(2));
        assert_eq!(proofs[1].keyset_id, "00aa");
        assert_eq!(token.entries[0].unit.as_deref(), Some("sat"));
    }

    #[test]
    fn test_compact_top_level_proofs() {
        let value = Value::map([
            ("m", Value::from("https://mint.example.com")),
            ("i", Value::from(vec![0x00, 0xad])),
            (
                "p",
                Value::Array(vec![Value::map([
                    ("a", Value::from(16)),
                    ("s", Value::from("flat")),
                    ("c", Value::from(vec![0x02, 0x01])),
                ])]),
            ),
        ]);
        let token = format!(
            "cashuB{}",
            general_purpose::URL_SAFE_NO_PAD.encode(cbor::encode(&value).unwrap())
        );

        let parsed = parse_token(&token).unwrap();
        let proofs = parsed.proofs();
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].keyset_id, "00ad");
        assert_eq!(proofs[0].c, "0201");
        assert_eq!(proofs[0].mint_url.as_deref(), Some("https://mint.example.com"));
    }

    #[test]
    fn test_standard_alphabet_payload() {
        let json = r#"{"token":[{"mint":"https://m.example","proofs":[{"amount":1,"secret":"??>>","C":"02"}]}]}"#;
        let standard = general_purpose::STANDARD.encode(json);
        let parsed = parse_token(&format!("cashuA{standard}")).unwrap();
        assert_eq!(parsed.proofs()[0].secret, "??>>");
    }

    #[test]
    fn test_incorrect_tokens() {
        assert!(matches!(
            parse_token("abc123"),
            Err(Error::InvalidTokenFormat)
        ));
        assert!(matches!(parse_token(""), Err(Error::InvalidTokenFormat)));
        assert!(matches!(
            parse_token("cashuCabcd"),
            Err(Error::UnsupportedVersion('C'))
        ));
        assert!(matches!(parse_token("cashuA"), Err(Error::MissingPayload)));
        assert!(matches!(parse_token("cashu"), Err(Error::MissingPayload)));
        assert!(parse_token("casshuAeyJ0b2tlbiI6W119").is_err());
        assert!(parse_token("cashuA!!!!").is_err());
        assert!(parse_token("{not json").is_err());
        // Valid CBOR but not a map
        assert!(matches!(
            parse_token("cashuBgQE"),
            Err(Error::InvalidPayload)
        ));
    }

    #[test]
    fn test_serialize_requires_proofs() {
        assert!(matches!(
            serialize_token(&[], "https://m", TokenVersion::B, None, None),
            Err(Error::ProofsRequired)
        ));
    }
}

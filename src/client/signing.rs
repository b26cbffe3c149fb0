//! Canonical query building and HMAC-SHA256 request signatures.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ClientError;

type HmacSha256 = Hmac<Sha256>;

pub fn canonical_query(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", encode_component(k), encode_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        let c = b as char;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
            out.push(c);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

pub fn sign_query(secret: &str, query: &str) -> Result<String, ClientError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ClientError::Protocol(format!("hmac key rejected: {err}")))?;
    mac.update(query.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_matches_exchange_doc_vector() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            sign_query(secret, query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn canonical_query_encodes_reserved_characters() {
        let params = vec![
            ("incomeType".to_string(), "FUNDING_FEE".to_string()),
            ("note".to_string(), "a b&c".to_string()),
        ];
        assert_eq!(canonical_query(&params), "incomeType=FUNDING_FEE&note=a%20b%26c");
    }
}

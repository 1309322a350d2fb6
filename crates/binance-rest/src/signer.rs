//! HMAC-SHA256 request signing.

use crate::credentials::ApiCredentials;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs query strings for `SIGNED` endpoints.
pub(crate) struct RequestSigner<'a> {
    credentials: &'a ApiCredentials,
}

impl<'a> RequestSigner<'a> {
    pub(crate) fn new(credentials: &'a ApiCredentials) -> Self {
        Self { credentials }
    }

    /// Lowercase hex HMAC-SHA256 of `message` under the secret key.
    pub(crate) fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.credentials.expose_secret().as_bytes())
            .expect("HMAC can take key of any size");

        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Query string with `timestamp` appended and the signature last.
    ///
    /// Parameter order is preserved; values must already be URL-safe.
    pub(crate) fn sign_params(&self, params: &[(&str, &str)], timestamp_ms: i64) -> String {
        let mut query_parts: Vec<String> =
            params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        query_parts.push(format!("timestamp={}", timestamp_ms));

        let query_string = query_parts.join("&");
        let signature = self.sign(&query_string);
        format!("{}&signature={}", query_string, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_known_vector() {
        // Published Binance example key pair and query
        let creds = ApiCredentials::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A".into(),
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
        );
        let signer = RequestSigner::new(&creds);

        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            signer.sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_sign_params_keeps_order_and_appends_signature() {
        let creds = ApiCredentials::new("key".into(), "secret".into());
        let signer = RequestSigner::new(&creds);

        let result = signer.sign_params(&[("symbol", "BNBUSDT"), ("side", "BUY")], 1000);
        let (query, signature) = result.split_once("&signature=").unwrap();

        assert_eq!(query, "symbol=BNBUSDT&side=BUY&timestamp=1000");
        assert_eq!(signature, signer.sign(query));
    }
}

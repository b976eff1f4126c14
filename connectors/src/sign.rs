use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub fn hmac_sha256_hex(message: impl AsRef<[u8]>, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_ref());
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha512_hex(message: impl AsRef<[u8]>, secret: &str) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(message.as_ref());
    hex::encode(mac.finalize().into_bytes())
}

/// URL-encodes parameters as `k=v&k=v`, sorted by key.
///
/// Both exchanges sign the exact encoded string, so the same function must
/// produce the signed text and the text sent on the wire.
pub fn encode_params(params: &[(&str, String)]) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Prefix GitHub places in front of the hex digest in `X-Hub-Signature-256`.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies a webhook body against the `X-Hub-Signature-256` header value.
///
/// Fails closed when either the header or the secret is empty. The computed
/// `sha256=<hex>` string is compared with the provided header in constant time.
pub fn verify_signature(body: &[u8], signature_header: &str, secret: &str) -> bool {
    if signature_header.is_empty() || secret.is_empty() {
        return false;
    }

    let Some(expected) = compute_signature(body, secret) else {
        return false;
    };

    expected.as_bytes().ct_eq(signature_header.as_bytes()).into()
}

/// Computes the `sha256=<hex>` signature GitHub would send for `body`.
///
/// Returns `None` when the MAC cannot be keyed with `secret`.
pub fn compute_signature(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Some(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";

    #[test]
    fn matches_github_reference_signature() {
        // Reference vector from GitHub's webhook validation guide.
        let expected = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert_eq!(compute_signature(BODY, SECRET).as_deref(), Some(expected));
        assert!(verify_signature(BODY, expected, SECRET));
    }

    #[test]
    fn accepts_freshly_computed_signatures() {
        let payloads: [&[u8]; 4] = [b"", b"{}", br#"{"action":"published"}"#, &[0xff, 0x00, 0x7f]];
        for payload in payloads {
            let signature = compute_signature(payload, "s3cr3t").expect("signature");
            assert!(verify_signature(payload, &signature, "s3cr3t"));
        }
    }

    #[test]
    fn rejects_single_bit_mutations() {
        let signature = compute_signature(BODY, SECRET).expect("signature");
        for index in 0..BODY.len() {
            for bit in 0..8 {
                let mut mutated = BODY.to_vec();
                mutated[index] ^= 1 << bit;
                assert!(
                    !verify_signature(&mutated, &signature, SECRET),
                    "mutation at byte {index} bit {bit} should fail"
                );
            }
        }
    }

    #[test]
    fn fails_closed_on_empty_inputs() {
        let signature = compute_signature(BODY, SECRET).expect("signature");
        assert!(!verify_signature(BODY, &signature, ""));
        assert!(!verify_signature(BODY, "", SECRET));
        assert!(!verify_signature(BODY, "", ""));
    }

    #[test]
    fn rejects_wrong_secret_and_malformed_headers() {
        let signature = compute_signature(BODY, SECRET).expect("signature");
        assert!(!verify_signature(BODY, &signature, "another secret"));

        let bare_hex = signature.trim_start_matches(SIGNATURE_PREFIX);
        assert!(!verify_signature(BODY, bare_hex, SECRET));
        assert!(!verify_signature(BODY, &signature.to_uppercase(), SECRET));
        assert!(!verify_signature(BODY, "sha256=deadbeef", SECRET));
    }
}

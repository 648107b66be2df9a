#![forbid(unsafe_code)]

use proptest::prelude::*;
use routelens::core::signing::{generate_keypair, RequestSigner, RequestVerifier, SigningError};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// For any query and timestamp, verification succeeds anywhere inside
    /// the 30-second window and fails just past it.
    #[test]
    fn sign_verify_window(query in ".{0,128}", ts in 1_000_000_000i64..2_000_000_000i64, skew in 0i64..=30i64) {
        let (secret, public) = generate_keypair().unwrap();
        let signer = RequestSigner::new(&secret);
        let verifier = RequestVerifier::new(&public);

        let req = signer.sign_at(&query, ts).unwrap();
        prop_assert!(verifier.verify_at(&req, ts + skew).is_ok());
        prop_assert!(matches!(
            verifier.verify_at(&req, ts + 31),
            Err(SigningError::ClockSkew)
        ));
    }

    /// Signatures never verify for a different query.
    #[test]
    fn signature_binds_the_query(query in "[a-z ]{1,64}", other in "[A-Z]{1,64}") {
        let (secret, public) = generate_keypair().unwrap();
        let signer = RequestSigner::new(&secret);
        let verifier = RequestVerifier::new(&public);

        let mut req = signer.sign_at(&query, 1_700_000_000).unwrap();
        req.query = other.clone();
        prop_assert!(verifier.verify_at(&req, 1_700_000_000).is_err());
    }
}

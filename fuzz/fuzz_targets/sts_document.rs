//! Fuzz target for decoding cached STS credential documents

#![no_main]

use libfuzzer_sys::fuzz_target;
use maws_cache::{ExpiryPolicy, StsCredentials};

fuzz_target!(|data: &[u8]| {
    let Ok(credentials) = serde_json::from_slice::<StsCredentials>(data) else {
        return;
    };

    // Decoded documents must survive a write and read unchanged
    let encoded = serde_json::to_vec_pretty(&credentials).expect("serialize");
    let decoded: StsCredentials = serde_json::from_slice(&encoded).expect("reparse");
    assert_eq!(decoded, credentials);

    let _ = ExpiryPolicy::default().sts_credentials_are_fresh(&credentials, credentials.expiration);
});

use cardcore::cipher::validate_lengths;
use cardcore::{CipherAlgorithm, CipherError};

fn hex_bytes(n: usize) -> String {
    "AB".repeat(n)
}

#[test]
fn test_none_accepts_anything() {
    assert!(validate_lengths(CipherAlgorithm::None, "", "").is_ok());
    assert!(validate_lengths(CipherAlgorithm::None, "not hex", "zz").is_ok());
}

#[test]
fn test_des_key_and_iv_sizes() {
    assert!(validate_lengths(CipherAlgorithm::Des, &hex_bytes(8), &hex_bytes(8)).is_ok());

    let err = validate_lengths(CipherAlgorithm::Des, &hex_bytes(7), &hex_bytes(8)).unwrap_err();
    assert!(matches!(
        err,
        CipherError::InvalidLength {
            role: "key",
            got: 7,
            ..
        }
    ));
}

#[test]
fn test_triple_des_accepts_both_key_sizes() {
    assert!(validate_lengths(CipherAlgorithm::TripleDes, &hex_bytes(16), &hex_bytes(8)).is_ok());
    assert!(validate_lengths(CipherAlgorithm::TripleDes, &hex_bytes(24), &hex_bytes(8)).is_ok());
    assert!(validate_lengths(CipherAlgorithm::TripleDes, &hex_bytes(8), &hex_bytes(8)).is_err());
}

#[test]
fn test_aes_key_sizes_and_iv() {
    for key_len in [16, 24, 32] {
        assert!(
            validate_lengths(CipherAlgorithm::Aes, &hex_bytes(key_len), &hex_bytes(16)).is_ok()
        );
    }

    let err = validate_lengths(CipherAlgorithm::Aes, &hex_bytes(16), &hex_bytes(8)).unwrap_err();
    assert!(matches!(
        err,
        CipherError::InvalidLength {
            role: "iv",
            got: 8,
            ..
        }
    ));
}

#[test]
fn test_non_hex_key_rejected() {
    let err = validate_lengths(CipherAlgorithm::Aes, "nothexnothexnoth", &hex_bytes(16))
        .unwrap_err();
    assert!(matches!(err, CipherError::NotHex { role: "key" }));

    let err = validate_lengths(CipherAlgorithm::Des, &hex_bytes(8), "").unwrap_err();
    assert!(matches!(err, CipherError::NotHex { role: "iv" }));
}

use cardcore::{CipherAlgorithm, CipherError, CipherProvider};
use cardruntime::BlockCipherProvider;

fn unhex(s: &str) -> Vec<u8> {
    hex::decode(s).unwrap()
}

#[test]
fn test_aes_cbc_known_vector_first_block() {
    // NIST SP 800-38A F.2.1, first block; padding only appends after it
    let provider = BlockCipherProvider;
    let key = unhex("2B7E151628AED2A6ABF7158809CF4F3C");
    let iv = unhex("000102030405060708090A0B0C0D0E0F");
    let plaintext = unhex("6BC1BEE22E409F96E93D7E117393172A");

    let ciphertext = provider
        .encrypt(CipherAlgorithm::Aes, &key, &iv, &plaintext)
        .unwrap();

    assert_eq!(ciphertext.len(), 32, "one data block plus one padding block");
    assert_eq!(
        hex::encode_upper(&ciphertext[..16]),
        "7649ABAC8119B246CEE98E9B12E9197D"
    );

    let recovered = provider
        .decrypt(CipherAlgorithm::Aes, &key, &iv, &ciphertext)
        .unwrap();
    assert_eq!(recovered, plaintext);
}

#[test]
fn test_des_and_triple_des_round_trip() {
    let provider = BlockCipherProvider;
    let iv = unhex("0000000000000000");
    let plaintext = unhex("0011223344556677");

    let des_key = unhex("0123456789ABCDEF");
    let ct = provider
        .encrypt(CipherAlgorithm::Des, &des_key, &iv, &plaintext)
        .unwrap();
    assert_ne!(ct[..8], plaintext[..]);
    let pt = provider
        .decrypt(CipherAlgorithm::Des, &des_key, &iv, &ct)
        .unwrap();
    assert_eq!(pt, plaintext);

    // Both keying options of 3DES
    for key_hex in [
        "0123456789ABCDEFFEDCBA9876543210",
        "0123456789ABCDEFFEDCBA98765432100123456789ABCDEF",
    ] {
        let key = unhex(key_hex);
        let ct = provider
            .encrypt(CipherAlgorithm::TripleDes, &key, &iv, &plaintext)
            .unwrap();
        let pt = provider
            .decrypt(CipherAlgorithm::TripleDes, &key, &iv, &ct)
            .unwrap();
        assert_eq!(pt, plaintext);
    }
}

#[test]
fn test_pass_through_copies_input() {
    let provider = BlockCipherProvider;
    let data = unhex("DEADBEEF");
    assert_eq!(
        provider
            .encrypt(CipherAlgorithm::None, &[], &[], &data)
            .unwrap(),
        data
    );
    assert_eq!(
        provider
            .decrypt(CipherAlgorithm::None, &[], &[], &data)
            .unwrap(),
        data
    );
}

#[test]
fn test_decrypt_rejects_unaligned_input() {
    let provider = BlockCipherProvider;
    let key = unhex("2B7E151628AED2A6ABF7158809CF4F3C");
    let iv = unhex("000102030405060708090A0B0C0D0E0F");

    let err = provider
        .decrypt(CipherAlgorithm::Aes, &key, &iv, &unhex("001122"))
        .unwrap_err();
    assert!(matches!(err, CipherError::NotBlockAligned(3, 16)));

    let err = provider
        .decrypt(CipherAlgorithm::Aes, &key, &iv, &[])
        .unwrap_err();
    assert!(matches!(err, CipherError::NotBlockAligned(0, 16)));
}

#[test]
fn test_bad_key_size_reports_expected() {
    let provider = BlockCipherProvider;
    let err = provider
        .encrypt(
            CipherAlgorithm::TripleDes,
            &[0u8; 8],
            &[0u8; 8],
            &[0u8; 8],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        CipherError::InvalidLength {
            role: "key",
            got: 8,
            ..
        }
    ));
}

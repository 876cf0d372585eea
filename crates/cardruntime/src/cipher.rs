use aes::{Aes128, Aes192, Aes256};
use cardcore::{CipherAlgorithm, CipherError, CipherProvider};
use cbc::{Decryptor, Encryptor};
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::{Des, TdesEde2, TdesEde3};

/// CBC-mode block cipher provider over the RustCrypto primitives, with
/// PKCS#7 padding on encrypt and unpadding on decrypt. The pass-through
/// algorithm copies its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCipherProvider;

fn encrypt_cbc<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError>
where
    Encryptor<C>: KeyIvInit + BlockEncryptMut,
    C: cipher::BlockCipher + cipher::BlockEncrypt,
{
    let enc = Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CipherError::Backend(e.to_string()))?;
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(data))
}

fn decrypt_cbc<C>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError>
where
    Decryptor<C>: KeyIvInit + BlockDecryptMut,
    C: cipher::BlockCipher + cipher::BlockDecrypt,
{
    let dec = Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CipherError::Backend(e.to_string()))?;
    dec.decrypt_padded_vec_mut::<Pkcs7>(data)
        .map_err(|_| CipherError::Unpad)
}

impl CipherProvider for BlockCipherProvider {
    fn encrypt(
        &self,
        algorithm: CipherAlgorithm,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        match algorithm {
            CipherAlgorithm::None => Ok(data.to_vec()),
            CipherAlgorithm::Des => encrypt_cbc::<Des>(key, iv, data),
            CipherAlgorithm::TripleDes => match key.len() {
                16 => encrypt_cbc::<TdesEde2>(key, iv, data),
                24 => encrypt_cbc::<TdesEde3>(key, iv, data),
                got => Err(CipherError::InvalidLength {
                    role: "key",
                    algorithm: "3DES",
                    got,
                    expected: "16 or 24",
                }),
            },
            CipherAlgorithm::Aes => match key.len() {
                16 => encrypt_cbc::<Aes128>(key, iv, data),
                24 => encrypt_cbc::<Aes192>(key, iv, data),
                32 => encrypt_cbc::<Aes256>(key, iv, data),
                got => Err(CipherError::InvalidLength {
                    role: "key",
                    algorithm: "AES",
                    got,
                    expected: "16, 24 or 32",
                }),
            },
        }
    }

    fn decrypt(
        &self,
        algorithm: CipherAlgorithm,
        key: &[u8],
        iv: &[u8],
        data: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        let block = algorithm.block_size();
        if block > 0 && (data.is_empty() || data.len() % block != 0) {
            return Err(CipherError::NotBlockAligned(data.len(), block));
        }
        match algorithm {
            CipherAlgorithm::None => Ok(data.to_vec()),
            CipherAlgorithm::Des => decrypt_cbc::<Des>(key, iv, data),
            CipherAlgorithm::TripleDes => match key.len() {
                16 => decrypt_cbc::<TdesEde2>(key, iv, data),
                24 => decrypt_cbc::<TdesEde3>(key, iv, data),
                got => Err(CipherError::InvalidLength {
                    role: "key",
                    algorithm: "3DES",
                    got,
                    expected: "16 or 24",
                }),
            },
            CipherAlgorithm::Aes => match key.len() {
                16 => decrypt_cbc::<Aes128>(key, iv, data),
                24 => decrypt_cbc::<Aes192>(key, iv, data),
                32 => decrypt_cbc::<Aes256>(key, iv, data),
                got => Err(CipherError::InvalidLength {
                    role: "key",
                    algorithm: "AES",
                    got,
                    expected: "16, 24 or 32",
                }),
            },
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity must not be empty")]
    Empty,

    #[error("Identity too long: {0} chars")]
    TooLong(usize),

    #[error("Identity contains invalid characters: {0:?}")]
    InvalidCharacters(String),
}

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::digest::DynDigest;
use sha2::Digest;
use log::debug;

use crate::error::{Error, Result};

/// Smallest modulus accepted for a node identity.
pub const MIN_KEY_BITS: usize = 1024;
/// Largest modulus accepted; anything bigger makes start-up unreasonably slow.
pub const MAX_KEY_BITS: usize = 8192;

/// Generate a fresh RSA keypair from the OS random source.
pub fn generate_keypair(modulus_bits: usize) -> Result<(RsaPrivateKey, RsaPublicKey)> {
    if !(MIN_KEY_BITS..=MAX_KEY_BITS).contains(&modulus_bits) {
        return Err(Error::KeyGeneration(format!(
            "modulus of {} bits is outside {}..={}",
            modulus_bits, MIN_KEY_BITS, MAX_KEY_BITS
        )));
    }

    let private_key = RsaPrivateKey::new(&mut OsRng, modulus_bits)
        .map_err(|e| Error::KeyGeneration(e.to_string()))?;
    let public_key = private_key.to_public_key();
    debug!("Generated {}-bit RSA keypair", modulus_bits);

    Ok((private_key, public_key))
}

/// Maximum plaintext bytes one OAEP block can carry for this key and digest.
///
/// `key_size_bytes - 2 * digest_size - 2`, or zero when the key is too
/// small for the digest.
pub fn block_size<D: Digest>(key: &RsaPublicKey) -> usize {
    let hash_size = <D as Digest>::output_size();
    key.size().saturating_sub(2 * hash_size + 2)
}

/// Encrypt an arbitrary-length plaintext as a sequence of OAEP blocks.
///
/// Every output block is exactly `key.size()` bytes long, so the ciphertext
/// length is `ceil(len / block_size) * key.size()`. An empty plaintext
/// produces an empty ciphertext.
pub fn encrypt<D>(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>>
where
    D: 'static + Digest + DynDigest + Send + Sync,
{
    let step = block_size::<D>(key);
    if step == 0 {
        return Err(Error::Encryption(rsa::Error::MessageTooLong));
    }

    let mut ciphertext = Vec::with_capacity(plaintext.len().div_ceil(step) * key.size());
    for block in plaintext.chunks(step) {
        let encrypted = key.encrypt(&mut OsRng, Oaep::new::<D>(), block)?;
        ciphertext.extend_from_slice(&encrypted);
    }

    Ok(ciphertext)
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// The input is consumed in fixed `key.size()` windows. A length that is not
/// a whole number of windows, or any block that fails to decrypt, fails the
/// whole call; partial plaintext is never returned.
pub fn decrypt<D>(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>>
where
    D: 'static + Digest + DynDigest + Send + Sync,
{
    let window = key.size();
    if ciphertext.len() % window != 0 {
        return Err(Error::Decryption(format!(
            "ciphertext length {} is not a multiple of the {}-byte block",
            ciphertext.len(),
            window
        )));
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    for (idx, block) in ciphertext.chunks(window).enumerate() {
        let decrypted = key
            .decrypt_blinded(&mut OsRng, Oaep::new::<D>(), block)
            .map_err(|e| Error::Decryption(format!("block {}: {}", idx, e)))?;
        plaintext.extend_from_slice(&decrypted);
    }

    Ok(plaintext)
}

//! Block chaining over the AES core: OFB, CFB and CBC with PKCS#7 padding.
//!
//! OFB and CFB tolerate a short final chunk (the keystream is truncated to
//! the remaining length). CBC operates on whole blocks only; callers pad
//! with [`pad_pkcs7`] first. [`encrypt_data`]/[`decrypt_data`] wrap the
//! common CBC case with a fresh IV transmitted in the clear ahead of the
//! ciphertext.

use anyhow::Result;

use crate::error::CryptoError;

use super::{Aes, BLOCK_LEN, IV_LEN, secure_random};

/// Chaining mode for [`chain_encrypt`]/[`chain_decrypt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Cbc,
    Cfb,
    Ofb,
}

/// Appends PKCS#7 padding, always between 1 and 16 bytes of the pad length.
pub fn pad_pkcs7(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_LEN - data.len() % BLOCK_LEN;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    out.extend(std::iter::repeat_n(pad as u8, pad));
    out
}

/// Removes PKCS#7 padding.
///
/// # Errors
///
/// Returns [`CryptoError::Padding`] if the buffer is empty, not a multiple
/// of the block size, or carries a pad length byte above 16.
pub fn strip_pkcs7(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() || data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Padding);
    }
    let pad = data[data.len() - 1] as usize;
    if pad > BLOCK_LEN {
        return Err(CryptoError::Padding);
    }
    Ok(data[..data.len() - pad].to_vec())
}

fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
    if iv.is_empty() || iv.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::IvLength(iv.len()));
    }
    Ok(())
}

fn xor_into(out: &mut Vec<u8>, chunk: &[u8], keystream: &[u8; BLOCK_LEN]) {
    out.extend(chunk.iter().zip(keystream).map(|(p, k)| p ^ k));
}

/// Encrypts `data` under the given chaining mode.
///
/// CBC input must already be padded to whole blocks; OFB/CFB accept any
/// length and truncate the final keystream block.
///
/// # Errors
///
/// [`CryptoError::KeySize`] for a bad key, [`CryptoError::IvLength`] for an
/// IV that is not a whole number of blocks, [`CryptoError::Padding`] for
/// unpadded CBC input.
pub fn chain_encrypt(data: &[u8], mode: Mode, key: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    let aes = Aes::new(key)?;
    if mode == Mode::Cbc && data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Padding);
    }

    let mut prev: [u8; BLOCK_LEN] = iv[..BLOCK_LEN].try_into().unwrap();
    let mut out = Vec::with_capacity(data.len());

    for chunk in data.chunks(BLOCK_LEN) {
        match mode {
            Mode::Ofb => {
                prev = aes.encrypt_block(&prev);
                xor_into(&mut out, chunk, &prev);
            }
            Mode::Cfb => {
                let ks = aes.encrypt_block(&prev);
                let start = out.len();
                xor_into(&mut out, chunk, &ks);
                if chunk.len() == BLOCK_LEN {
                    prev.copy_from_slice(&out[start..]);
                }
            }
            Mode::Cbc => {
                let mut block = [0u8; BLOCK_LEN];
                for (b, (p, c)) in block.iter_mut().zip(prev.iter().zip(chunk)) {
                    *b = p ^ c;
                }
                prev = aes.encrypt_block(&block);
                out.extend_from_slice(&prev);
            }
        }
    }
    Ok(out)
}

/// Decrypts `data` produced by [`chain_encrypt`].
///
/// For CBC, `original_size` truncates the output when the caller recorded
/// the plaintext length separately instead of using PKCS#7 padding.
pub fn chain_decrypt(
    data: &[u8],
    original_size: Option<usize>,
    mode: Mode,
    key: &[u8],
    iv: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_iv(iv)?;
    let aes = Aes::new(key)?;
    if mode == Mode::Cbc && data.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Padding);
    }

    let mut prev: [u8; BLOCK_LEN] = iv[..BLOCK_LEN].try_into().unwrap();
    let mut out = Vec::with_capacity(data.len());

    for chunk in data.chunks(BLOCK_LEN) {
        match mode {
            Mode::Ofb => {
                prev = aes.encrypt_block(&prev);
                xor_into(&mut out, chunk, &prev);
            }
            Mode::Cfb => {
                let ks = aes.encrypt_block(&prev);
                xor_into(&mut out, chunk, &ks);
                if chunk.len() == BLOCK_LEN {
                    prev.copy_from_slice(chunk);
                }
            }
            Mode::Cbc => {
                let block: [u8; BLOCK_LEN] = chunk.try_into().unwrap();
                let mut plain = aes.decrypt_block(&block);
                for (p, c) in plain.iter_mut().zip(&prev) {
                    *p ^= c;
                }
                out.extend_from_slice(&plain);
                prev = block;
            }
        }
    }

    if mode == Mode::Cbc {
        if let Some(size) = original_size {
            if size < out.len() {
                out.truncate(size);
            }
        }
    }
    Ok(out)
}

/// Pads `data`, draws a fresh random IV and CBC-encrypts.
///
/// Output layout: `IV (16 bytes) || ciphertext`.
pub fn encrypt_data(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let padded = pad_pkcs7(data);

    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;

    let ciphertext = chain_encrypt(&padded, Mode::Cbc, key, &iv)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`encrypt_data`]: splits off the IV, CBC-decrypts, unpads.
pub fn decrypt_data(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < IV_LEN {
        return Err(CryptoError::Padding);
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);
    let padded = chain_decrypt(ciphertext, None, Mode::Cbc, key, iv)?;
    strip_pkcs7(&padded)
}

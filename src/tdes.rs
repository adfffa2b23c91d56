//! 3DES/DES primitives shared by BAC (C3) and Secure Messaging (C4):
//! two-key triple-DES CBC, ISO 9797-1 Algorithm 3 (Retail-MAC), DES parity
//! bits, and ISO 7816-4 padding.

use crate::error::{Error, Process, Result};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::{Des, TdesEde2};

type TdesCbcEnc = cbc::Encryptor<TdesEde2>;
type TdesCbcDec = cbc::Decryptor<TdesEde2>;

/// Set the DES parity bit (bit 0) of each byte so the byte's population
/// count is odd. DES's key schedule (PC-1) discards these bits, so this
/// has no effect on encryption/decryption; it is kept because it is the
/// convention ICAO 9303-11 Annex D key derivation follows.
pub fn set_parity_bits(key: &mut [u8]) {
    for b in key.iter_mut() {
        let upper_ones = (*b >> 1).count_ones();
        *b = (*b & 0xFE) | u8::from(upper_ones % 2 == 0);
    }
}

/// Encrypt `data` (must already be a multiple of 8 bytes) with two-key
/// triple-DES in CBC mode, IV all-zero.
pub fn enc_3des_cbc(key: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let iv = [0u8; 8];
    TdesCbcEnc::new(key.into(), &iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(data)
}

/// Decrypt `data` with two-key triple-DES in CBC mode, IV all-zero. `data`
/// must be a multiple of 8 bytes; when it isn't — which a card can force by
/// sending a malformed-length `0x87` object — this returns `CipherFormat`
/// tagged with `process` rather than panicking.
pub fn dec_3des_cbc(key: &[u8; 16], data: &[u8], process: Process) -> Result<Vec<u8>> {
    if data.len() % 8 != 0 {
        return Err(Error::CipherFormat {
            process,
            detail: format!("ciphertext length {} is not a multiple of 8", data.len()),
        });
    }
    let iv = [0u8; 8];
    TdesCbcDec::new(key.into(), &iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| Error::CipherFormat {
            process,
            detail: "3DES-CBC decryption failed".to_string(),
        })
}

/// ISO 9797-1 Algorithm 3 (Retail-MAC): DES-CBC-MAC under `K1` (the key's
/// first 8 bytes) over every block but the last, then the final block is
/// processed as `Ek1(Dk2(Ek1(...)))` — equivalent to encrypting it with
/// two-key triple-DES. `message` must already be ISO 7816-4 padded to a
/// multiple of 8 bytes.
pub fn retail_mac(key: &[u8; 16], message: &[u8]) -> [u8; 8] {
    assert_eq!(message.len() % 8, 0, "message must be block-aligned");
    assert!(!message.is_empty(), "message must be non-empty");

    let k1 = GenericArray::clone_from_slice(&key[0..8]);
    let k2 = GenericArray::clone_from_slice(&key[8..16]);
    let des1 = Des::new(&k1);
    let des2 = Des::new(&k2);

    let mut chain = GenericArray::default();
    let blocks: Vec<&[u8]> = message.chunks(8).collect();
    let (last, rest) = blocks.split_last().expect("checked non-empty above");
    for block in rest {
        xor_into(&mut chain, block);
        des1.encrypt_block(&mut chain);
    }
    xor_into(&mut chain, last);
    des1.encrypt_block(&mut chain);
    des2.decrypt_block(&mut chain);
    des1.encrypt_block(&mut chain);
    chain.into()
}

fn xor_into(chain: &mut GenericArray<u8, des::cipher::consts::U8>, block: &[u8]) {
    for (c, b) in chain.iter_mut().zip(block) {
        *c ^= b;
    }
}

/// ISO 7816-4 padding: append `0x80`, then zero bytes to the next 8-byte
/// boundary.
pub fn pad_iso7816_4(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 8);
    out.extend_from_slice(data);
    out.push(0x80);
    while out.len() % 8 != 0 {
        out.push(0x00);
    }
    out
}

/// Strip ISO 7816-4 padding: scan from the end, skipping `0x00` bytes until
/// the first non-zero byte, which must be `0x80`. If no `0x80` is ever
/// found the entire buffer is returned unmodified (the defensive fallback
/// preserved from the source behavior — see the crate's design notes).
pub fn unpad_iso7816_4(data: &[u8], process: Process) -> Result<Vec<u8>> {
    let mut i = data.len();
    while i > 0 && data[i - 1] == 0x00 {
        i -= 1;
    }
    if i == 0 {
        tracing::warn!(
            ?process,
            "ISO 7816-4 unpad found no 0x80 marker; returning buffer unmodified"
        );
        return Ok(data.to_vec());
    }
    if data[i - 1] != 0x80 {
        return Err(Error::CipherFormat {
            process,
            detail: format!("expected 0x80 padding marker, found {:#04X}", data[i - 1]),
        });
    }
    Ok(data[..i - 1].to_vec())
}

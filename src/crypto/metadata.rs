// LibriSync - Audible Library Sync for Mobile
// Copyright (C) 2025 Henning Berge
//
// This program is a Rust port of Libation (https://github.com/rmcrackan/Libation)
// Original work Copyright (C) Libation contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Login metadata obfuscation
//!
//! The sign-in form carries a `metadata1` hidden field holding a browser
//! fingerprint. Amazon expects it wrapped as:
//!
//! 1. `"{CRC32:08X}#{json}"`
//! 2. packed into little-endian `u32` words, zero padded
//! 3. mixed with XXTEA under a fixed key
//! 4. base64 (standard alphabet) with the `ECdITeCs:` prefix
//!
//! [`deobfuscate`] reverses the steps and rejects input whose embedded
//! checksum does not match.

use base64::{engine::general_purpose, Engine as _};

use crate::error::{AuthError, Result};

/// Prefix of every obfuscated metadata value
pub const METADATA_PREFIX: &str = "ECdITeCs:";

const KEY: [u32; 4] = [1888420705, 2576816180, 2347232058, 874813317];
const DELTA: u32 = 0x9E37_79B9;

/// Obfuscate a fingerprint string for the `metadata1` form field
pub fn obfuscate(plain: &str) -> String {
    let checksum = crc32fast::hash(plain.as_bytes());
    let framed = format!("{:08X}#{}", checksum, plain);

    let mut words = bytes_to_words(framed.as_bytes());
    xxtea_encrypt(&mut words, &KEY);

    format!(
        "{}{}",
        METADATA_PREFIX,
        general_purpose::STANDARD.encode(words_to_bytes(&words))
    )
}

/// Recover the original string from [`obfuscate`] output
///
/// # Errors
/// `CryptoFormat` if the prefix, base64, word alignment, UTF-8 or the
/// embedded CRC-32 checksum is wrong.
pub fn deobfuscate(encoded: &str) -> Result<String> {
    let body = encoded
        .strip_prefix(METADATA_PREFIX)
        .ok_or_else(|| AuthError::crypto("Metadata is missing the ECdITeCs: prefix"))?;

    let raw = general_purpose::STANDARD.decode(body)?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(AuthError::crypto(format!(
            "Metadata payload length {} is not a whole number of words",
            raw.len()
        )));
    }

    let mut words = bytes_to_words(&raw);
    xxtea_decrypt(&mut words, &KEY);
    let bytes = words_to_bytes(&words);

    // Up to three zero bytes were appended to fill the last word. The input
    // itself may end in NUL, so the checksum decides how many to drop.
    for pad in 0..=3usize {
        if pad > bytes.len() || bytes[bytes.len() - pad..].iter().any(|b| *b != 0) {
            break;
        }
        if let Some(plain) = verify_frame(&bytes[..bytes.len() - pad]) {
            return Ok(plain);
        }
    }

    Err(AuthError::crypto("Metadata checksum mismatch"))
}

/// Split `"{CRC}#{text}"` and return `text` if the checksum matches
fn verify_frame(frame: &[u8]) -> Option<String> {
    if frame.len() < 9 || frame[8] != b'#' {
        return None;
    }
    let expected = std::str::from_utf8(&frame[..8]).ok()?;
    let expected = u32::from_str_radix(expected, 16).ok()?;
    let text = &frame[9..];
    if crc32fast::hash(text) != expected {
        return None;
    }
    String::from_utf8(text.to_vec()).ok()
}

fn bytes_to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[inline]
fn mx(sum: u32, y: u32, z: u32, p: usize, e: usize, key: &[u32; 4]) -> u32 {
    (((z >> 5) ^ (y << 2)).wrapping_add((y >> 3) ^ (z << 4)))
        ^ ((sum ^ y).wrapping_add(key[(p & 3) ^ e] ^ z))
}

fn xxtea_encrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n == 0 {
        return;
    }
    let mut rounds = 6 + 52 / n;
    let mut sum: u32 = 0;
    let mut z = v[n - 1];

    while rounds > 0 {
        sum = sum.wrapping_add(DELTA);
        let e = ((sum >> 2) & 3) as usize;
        for p in 0..n {
            let y = v[(p + 1) % n];
            v[p] = v[p].wrapping_add(mx(sum, y, z, p, e, key));
            z = v[p];
        }
        rounds -= 1;
    }
}

fn xxtea_decrypt(v: &mut [u32], key: &[u32; 4]) {
    let n = v.len();
    if n == 0 {
        return;
    }
    let rounds = 6 + 52 / n;
    let mut sum = DELTA.wrapping_mul(rounds as u32);
    let mut y = v[0];

    for _ in 0..rounds {
        let e = ((sum >> 2) & 3) as usize;
        for p in (0..n).rev() {
            let z = v[(p + n - 1) % n];
            v[p] = v[p].wrapping_sub(mx(sum, y, z, p, e, key));
            y = v[p];
        }
        sum = sum.wrapping_sub(DELTA);
    }
}

//! NTLM credential cryptography

use crate::error::{Error, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;

fn hmac_md5(key: &[u8], chunks: &[&[u8]]) -> Result<[u8; 16]> {
    let mut mac = Hmac::<Md5>::new_from_slice(key)
        .map_err(|e| Error::CryptoError(format!("HMAC error: {}", e)))?;
    for chunk in chunks {
        mac.update(chunk);
    }
    let mut out = [0u8; 16];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn utf16le(s: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for ch in s.encode_utf16() {
        bytes.write_u16::<LittleEndian>(ch)?;
    }
    Ok(bytes)
}

/// NT one-way function: MD4 of the UTF-16LE password
pub fn nt_hash(password: &str) -> Result<[u8; 16]> {
    let mut hasher = Md4::new();
    hasher.update(&utf16le(password)?);
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&hasher.finalize());
    Ok(hash)
}

/// NTLMv2 hash: HMAC-MD5 over the uppercased user+domain, keyed by the NT hash
pub fn ntlmv2_hash(username: &str, domain: &str, password: &str) -> Result<[u8; 16]> {
    let key = nt_hash(password)?;
    let user_domain = format!("{}{}", username.to_uppercase(), domain.to_uppercase());
    hmac_md5(&key, &[&utf16le(&user_domain)?])
}

/// Client-side payload of an NTLMv2 response
#[derive(Debug, Clone)]
pub struct Ntlmv2Blob {
    pub timestamp: u64,
    pub client_challenge: [u8; 8],
    pub target_info: Vec<u8>,
}

impl Ntlmv2Blob {
    pub fn new(timestamp: u64, client_challenge: [u8; 8], target_info: Vec<u8>) -> Self {
        Self {
            timestamp,
            client_challenge,
            target_info,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut blob = Vec::with_capacity(28 + self.target_info.len() + 4);
        // Signature and reserved
        blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
        blob.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        blob.write_u64::<LittleEndian>(self.timestamp)?;
        blob.extend_from_slice(&self.client_challenge);
        blob.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        blob.extend_from_slice(&self.target_info);
        blob.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        Ok(blob)
    }
}

/// NTLMv2 response: HMAC-MD5(v2 hash, server challenge + blob) followed by
/// the blob itself
pub fn ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    blob: &Ntlmv2Blob,
) -> Result<Vec<u8>> {
    let blob_bytes = blob.to_bytes()?;
    let proof = hmac_md5(ntlmv2_hash, &[server_challenge, &blob_bytes])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(&blob_bytes);
    Ok(response)
}

/// LMv2 response: HMAC-MD5(v2 hash, server + client challenge) followed by
/// the client challenge
pub fn lmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_challenge: &[u8; 8],
) -> Result<Vec<u8>> {
    let proof = hmac_md5(ntlmv2_hash, &[server_challenge, client_challenge])?;
    let mut response = proof.to_vec();
    response.extend_from_slice(client_challenge);
    Ok(response)
}

/// Generate a random 8-byte challenge
pub fn generate_challenge() -> [u8; 8] {
    let mut challenge = [0u8; 8];
    for byte in &mut challenge {
        *byte = rand::random();
    }
    challenge
}

/// Current Windows timestamp (100ns intervals since 1601-01-01)
pub fn windows_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    const WINDOWS_EPOCH_DIFF: u64 = 116_444_736_000_000_000;

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    (duration.as_secs() * 10_000_000 + duration.subsec_nanos() as u64 / 100) + WINDOWS_EPOCH_DIFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nt_hash_known_vector() {
        // MD4(UTF-16LE("password"))
        let hash = nt_hash("password").unwrap();
        assert_eq!(
            hash,
            [
                0x88, 0x46, 0xf7, 0xea, 0xee, 0x8f, 0xb1, 0x17, 0xad, 0x06, 0xbd, 0xd8, 0x30,
                0xb7, 0x58, 0x6c
            ]
        );
    }

    #[test]
    fn test_ntlmv2_hash_depends_on_identity() {
        let a = ntlmv2_hash("alice", "CORP", "password").unwrap();
        let b = ntlmv2_hash("bob", "CORP", "password").unwrap();
        assert_ne!(a, b);
        // Case-insensitive in username and domain
        let c = ntlmv2_hash("ALICE", "corp", "password").unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_blob_layout() {
        let blob = Ntlmv2Blob::new(0x0123_4567_89AB_CDEF, [1, 2, 3, 4, 5, 6, 7, 8], vec![0xAA]);
        let bytes = blob.to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &[0x01, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[16..24], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_response_shapes() {
        let hash = ntlmv2_hash("alice", "CORP", "password").unwrap();
        let server = [0u8; 8];
        let client = [1u8; 8];

        let lm = lmv2_response(&hash, &server, &client).unwrap();
        assert_eq!(lm.len(), 24);
        assert_eq!(&lm[16..], &client);

        let blob = Ntlmv2Blob::new(0, client, Vec::new());
        let nt = ntlmv2_response(&hash, &server, &blob).unwrap();
        assert!(nt.len() > 16);
    }

    #[test]
    fn test_generate_challenge() {
        assert_ne!(generate_challenge(), generate_challenge());
    }
}

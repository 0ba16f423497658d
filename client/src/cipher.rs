//! Authenticated encryption for values persisted in client storage.
//!
//! Keystream and tag are both HMAC-SHA256 with independent keys derived from
//! the configured passphrase (encrypt-then-MAC). A fresh random nonce is used
//! for every value, so sealing the same token twice gives different output.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const VERSION: u8 = 1;
const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 32;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("sealed value is not valid base64 or is truncated")]
    Malformed,
    #[error("sealed value failed authentication")]
    Tampered,
    #[error("sealed value does not decrypt to text")]
    NotText,
}

pub struct Cipher {
    enc_key: SecretBox<[u8; 32]>,
    mac_key: SecretBox<[u8; 32]>,
}

impl Cipher {
    pub fn new(passphrase: &SecretBox<String>) -> Self {
        let secret = passphrase.expose_secret().as_bytes();
        Self {
            enc_key: SecretBox::new(Box::new(prf(
                secret,
                &[b"encrypt".as_slice()],
            ))),
            mac_key: SecretBox::new(Box::new(prf(
                secret,
                &[b"authenticate".as_slice()],
            ))),
        }
    }

    pub fn seal(&self, plaintext: &str) -> String {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut out =
            Vec::with_capacity(1 + NONCE_LEN + plaintext.len() + TAG_LEN);
        out.push(VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plaintext.as_bytes());
        self.apply_keystream(&nonce, &mut out[1 + NONCE_LEN..]);

        let tag = self.tag(&out);
        out.extend_from_slice(&tag);
        STANDARD.encode(out)
    }

    pub fn open(&self, sealed: &str) -> Result<String, CipherError> {
        let bytes = STANDARD
            .decode(sealed.trim())
            .map_err(|_| CipherError::Malformed)?;
        if bytes.len() < 1 + NONCE_LEN + TAG_LEN || bytes[0] != VERSION {
            return Err(CipherError::Malformed);
        }

        let (body, tag) = bytes.split_at(bytes.len() - TAG_LEN);
        let mut mac = keyed(self.mac_key.expose_secret());
        mac.update(body);
        mac.verify_slice(tag).map_err(|_| CipherError::Tampered)?;

        let nonce: [u8; NONCE_LEN] = body[1..1 + NONCE_LEN]
            .try_into()
            .map_err(|_| CipherError::Malformed)?;
        let mut plaintext = body[1 + NONCE_LEN..].to_vec();
        self.apply_keystream(&nonce, &mut plaintext);
        String::from_utf8(plaintext).map_err(|_| CipherError::NotText)
    }

    fn tag(&self, body: &[u8]) -> [u8; TAG_LEN] {
        prf(self.mac_key.expose_secret(), &[body])
    }

    fn apply_keystream(&self, nonce: &[u8; NONCE_LEN], data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(32).enumerate() {
            let counter = (counter as u64).to_be_bytes();
            let block = prf(
                self.enc_key.expose_secret(),
                &[nonce.as_slice(), counter.as_slice()],
            );
            for (byte, key) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key;
            }
        }
    }
}

fn keyed(key: &[u8]) -> HmacSha256 {
    // HMAC is defined for keys of any length, so this cannot fail.
    <HmacSha256 as Mac>::new_from_slice(key)
        .expect("HMAC accepts keys of any length")
}

fn prf(key: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut mac = keyed(key);
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

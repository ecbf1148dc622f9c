//! Per-line decoding of the mailbox feed.
//!
//! A line is either a plain JSON object or, when a key is configured,
//! base64 of `IV(16) || AES-CBC(PKCS#7(json))`, with AES-128/192/256 picked
//! by the key length. Decoding is best-effort:
//! a bad line becomes a [`LineOutcome`] the caller logs and skips.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value;
use thiserror::Error;

use crate::api::models::Message;
use crate::logging::{Level, LogSink};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("decryption key must be 16, 24 or 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("invalid base64 payload: {0}")]
    Base64(String),

    #[error("payload too short: {0} bytes")]
    TooShort(usize),

    #[error("ciphertext length {0} is not a multiple of the block size")]
    BlockAlignment(usize),

    #[error("bad padding or wrong key")]
    Padding,

    #[error("decrypted payload is not UTF-8")]
    NotUtf8,
}

/// AES key taken verbatim from the configured key string. The byte length
/// selects the cipher.
#[derive(Clone, PartialEq, Eq)]
pub enum DecryptionKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl DecryptionKey {
    pub fn from_config(raw: &str) -> Result<Self, CodecError> {
        let bytes = raw.as_bytes();
        let bad_len = |_| CodecError::KeyLength(bytes.len());
        match bytes.len() {
            16 => Ok(Self::Aes128(bytes.try_into().map_err(bad_len)?)),
            24 => Ok(Self::Aes192(bytes.try_into().map_err(bad_len)?)),
            32 => Ok(Self::Aes256(bytes.try_into().map_err(bad_len)?)),
            n => Err(CodecError::KeyLength(n)),
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Aes128(k) => k.len(),
            Self::Aes192(k) => k.len(),
            Self::Aes256(k) => k.len(),
        }
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DecryptionKey(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Message(Message),
    Malformed(String),
    DecryptFailed(CodecError),
}

pub fn decode_line(line: &str, key: Option<&DecryptionKey>) -> LineOutcome {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value) => value,
        Err(json_err) => {
            let Some(key) = key else {
                return LineOutcome::Malformed(json_err.to_string());
            };
            let plaintext = match decrypt(line, key) {
                Ok(text) => text,
                Err(e) => return LineOutcome::DecryptFailed(e),
            };
            match serde_json::from_str::<Value>(&plaintext) {
                Ok(value) => value,
                Err(e) => return LineOutcome::Malformed(e.to_string()),
            }
        }
    };
    into_message(value)
}

fn into_message(value: Value) -> LineOutcome {
    if !value.is_object() {
        return LineOutcome::Malformed(format!("expected a JSON object, got {value}"));
    }
    match serde_json::from_value::<Message>(value) {
        Ok(msg) => LineOutcome::Message(msg),
        Err(e) => LineOutcome::Malformed(e.to_string()),
    }
}

/// Decode every line, logging and dropping the ones that fail.
pub fn decode_all<S>(lines: &[String], key: Option<&DecryptionKey>, sink: &S) -> Vec<Message>
where
    S: LogSink + ?Sized,
{
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        match decode_line(line, key) {
            LineOutcome::Message(msg) => out.push(msg),
            LineOutcome::Malformed(reason) => sink.log(
                &format!("JSON structure problem, unable to extract:\n {reason}"),
                Level::Warning,
                None,
            ),
            LineOutcome::DecryptFailed(err) => sink.log(
                &format!(
                    "Unexpected error in line while trying to decrypt remote API response:\n {err}"
                ),
                Level::Warning,
                None,
            ),
        }
    }
    out
}

fn decrypt(line: &str, key: &DecryptionKey) -> Result<String, CodecError> {
    let raw = BASE64
        .decode(line.trim())
        .map_err(|e| CodecError::Base64(e.to_string()))?;
    if raw.len() < IV_SIZE + BLOCK_SIZE {
        return Err(CodecError::TooShort(raw.len()));
    }
    let (iv, ciphertext) = raw.split_at(IV_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CodecError::BlockAlignment(ciphertext.len()));
    }
    let padded = match key {
        DecryptionKey::Aes128(k) => Aes128CbcDec::new_from_slices(k, iv)
            .map(|dec| dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        DecryptionKey::Aes192(k) => Aes192CbcDec::new_from_slices(k, iv)
            .map(|dec| dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
        DecryptionKey::Aes256(k) => Aes256CbcDec::new_from_slices(k, iv)
            .map(|dec| dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)),
    }
    .map_err(|_| CodecError::KeyLength(key.size()))?;
    let plain = padded.map_err(|_| CodecError::Padding)?;
    String::from_utf8(plain).map_err(|_| CodecError::NotUtf8)
}

/// Produce a feed line the way the mailbox server does.
pub fn encrypt_line(plaintext: &str, key: &DecryptionKey, iv: &[u8; IV_SIZE]) -> String {
    let plaintext = plaintext.as_bytes();
    let nonce = (*iv).into();
    let ciphertext = match key {
        DecryptionKey::Aes128(k) => {
            Aes128CbcEnc::new(&(*k).into(), &nonce).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        DecryptionKey::Aes192(k) => {
            Aes192CbcEnc::new(&(*k).into(), &nonce).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
        DecryptionKey::Aes256(k) => {
            Aes256CbcEnc::new(&(*k).into(), &nonce).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
        }
    };
    let mut combined = Vec::with_capacity(IV_SIZE + ciphertext.len());
    combined.extend_from_slice(iv);
    combined.extend_from_slice(&ciphertext);
    BASE64.encode(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::testing::RecordingSink;

    const KEY: &str = "0123456789abcdef0123456789abcdef";
    const IV: [u8; 16] = *b"fedcba9876543210";
    const LINE: &str =
        r#"{"from":"+30690000000","text":"Your code is 1234","receivedStamp":1700000000000}"#;

    fn key() -> DecryptionKey {
        DecryptionKey::from_config(KEY).unwrap()
    }

    #[test]
    fn plain_json_line_decodes_without_key() {
        let expected = Message::new("+30690000000", "Your code is 1234", 1_700_000_000_000);
        assert_eq!(decode_line(LINE, None), LineOutcome::Message(expected));
    }

    #[test]
    fn encrypted_line_decodes_with_key() {
        let line = encrypt_line(LINE, &key(), &IV);
        assert_ne!(line, LINE);
        let LineOutcome::Message(msg) = decode_line(&line, Some(&key())) else {
            panic!("encrypted line should decode");
        };
        assert_eq!(msg.from, "+30690000000");
        assert_eq!(msg.text, "Your code is 1234");
        assert_eq!(msg.received_at, 1_700_000_000_000);
    }

    #[test]
    fn encrypted_line_without_key_is_malformed() {
        let line = encrypt_line(LINE, &key(), &IV);
        assert!(matches!(decode_line(&line, None), LineOutcome::Malformed(_)));
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let line = encrypt_line(LINE, &key(), &IV);
        let other = DecryptionKey::from_config("ffffffffffffffffffffffffffffffff").unwrap();
        match decode_line(&line, Some(&other)) {
            LineOutcome::DecryptFailed(_) | LineOutcome::Malformed(_) => {}
            LineOutcome::Message(m) => panic!("wrong key produced a message: {m:?}"),
        }
    }

    #[test]
    fn garbage_is_a_decrypt_failure_not_a_panic() {
        assert!(matches!(
            decode_line("not base64 at all!", Some(&key())),
            LineOutcome::DecryptFailed(CodecError::Base64(_))
        ));
        assert!(matches!(
            decode_line(&BASE64.encode([0u8; 8]), Some(&key())),
            LineOutcome::DecryptFailed(CodecError::TooShort(8))
        ));
        assert!(matches!(
            decode_line(&BASE64.encode([0u8; 16 + 20]), Some(&key())),
            LineOutcome::DecryptFailed(CodecError::BlockAlignment(20))
        ));
    }

    #[test]
    fn non_object_json_is_malformed() {
        assert!(matches!(decode_line("42", None), LineOutcome::Malformed(_)));
        assert!(matches!(decode_line(r#"["a"]"#, None), LineOutcome::Malformed(_)));
        assert!(matches!(
            decode_line(r#"{"from":"x","text":"y"}"#, None),
            LineOutcome::Malformed(_)
        ));
    }

    #[test]
    fn key_length_picks_the_cipher() {
        assert_eq!(
            DecryptionKey::from_config("short"),
            Err(CodecError::KeyLength(5))
        );
        assert_eq!(
            DecryptionKey::from_config(&KEY[..20]),
            Err(CodecError::KeyLength(20))
        );
        assert!(matches!(
            DecryptionKey::from_config(&KEY[..16]),
            Ok(DecryptionKey::Aes128(_))
        ));
        assert!(matches!(
            DecryptionKey::from_config(&KEY[..24]),
            Ok(DecryptionKey::Aes192(_))
        ));
        assert!(matches!(
            DecryptionKey::from_config(KEY),
            Ok(DecryptionKey::Aes256(_))
        ));
    }

    #[test]
    fn aes128_and_aes192_lines_decode() {
        for raw in [&KEY[..16], &KEY[..24]] {
            let key = DecryptionKey::from_config(raw).unwrap();
            let line = encrypt_line(LINE, &key, &IV);
            let LineOutcome::Message(msg) = decode_line(&line, Some(&key)) else {
                panic!("{}-byte key should decode its own line", raw.len());
            };
            assert_eq!(msg.text, "Your code is 1234");
        }
    }

    #[test]
    fn decode_all_keeps_order_and_logs_bad_lines() {
        let sink = RecordingSink::default();
        let lines = vec![
            r#"{"from":"a","text":"1","receivedStamp":1}"#.to_string(),
            "garbage".to_string(),
            encrypt_line(r#"{"from":"b","text":"2","receivedStamp":2}"#, &key(), &IV),
        ];
        let messages = decode_all(&lines, Some(&key()), &sink);
        assert_eq!(
            messages,
            vec![Message::new("a", "1", 1), Message::new("b", "2", 2)]
        );
        assert_eq!(sink.levels(), vec![Level::Warning]);
    }
}

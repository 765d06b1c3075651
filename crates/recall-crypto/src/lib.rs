//! At-rest envelope encryption for backup archives
//!
//! The backup engine seals selected resource groups with AES-256-GCM; the
//! restore engine opens them here. A sealed object file stores a
//! JSON-encoded byte array whose payload is `nonce || ciphertext`, bound to
//! additional authenticated data derived from the object's filename (and
//! namespace, when namespaced) so a ciphertext cannot be transplanted
//! between objects without detection.
//!
//! Transformers are keyed per group/resource; groups without a transformer
//! are stored in clear text.

#![deny(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use recall_common::crd::EncryptionConfigSpec;
use recall_common::{Error, GroupResource};

/// AES-GCM nonce length in bytes, prefixed to every sealed payload
const NONCE_LEN: usize = 12;

/// Key length in bytes (AES-256)
const KEY_LEN: usize = 32;

/// A reversible bytes-to-bytes transformer binding payloads to AAD
pub trait Transformer: Send + Sync {
    /// Seal plaintext under this transformer's primary key
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error>;

    /// Open a sealed payload; fails on integrity or AAD mismatch
    fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Mapping from group/resource to its transformer; absence means clear text
pub type TransformerMap = HashMap<GroupResource, Arc<dyn Transformer>>;

/// AES-256-GCM transformer with key rotation support.
///
/// The first key seals; opening tries every key in order so payloads sealed
/// under rotated-out keys stay readable while the key remains listed.
pub struct AesGcmTransformer {
    ciphers: Vec<Aes256Gcm>,
}

impl AesGcmTransformer {
    /// Build from raw 32-byte keys, newest first
    pub fn new(keys: Vec<[u8; KEY_LEN]>) -> Result<Self, Error> {
        if keys.is_empty() {
            return Err(Error::serialization("encryption key list is empty"));
        }
        let ciphers = keys
            .iter()
            .map(|k| Aes256Gcm::new_from_slice(k))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::serialization(format!("invalid AES key: {}", e)))?;
        Ok(Self { ciphers })
    }

    /// Build from base64-encoded key material, newest first
    pub fn from_base64_keys<S: AsRef<str>>(encoded: &[S]) -> Result<Self, Error> {
        let mut keys = Vec::with_capacity(encoded.len());
        for secret in encoded {
            let bytes = BASE64.decode(secret.as_ref()).map_err(|e| {
                Error::serialization(format!("encryption key is not valid base64: {}", e))
            })?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
                Error::serialization(format!(
                    "encryption key must be {} bytes after base64 decoding",
                    KEY_LEN
                ))
            })?;
            keys.push(key);
        }
        Self::new(keys)
    }
}

impl Transformer for AesGcmTransformer {
    fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.ciphers[0]
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::serialization("aead seal failed"))?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, Error> {
        if sealed.len() < NONCE_LEN {
            return Err(Error::serialization("sealed payload shorter than nonce"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        for cipher in &self.ciphers {
            if let Ok(plaintext) = cipher.decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            ) {
                return Ok(plaintext);
            }
        }
        Err(Error::serialization(
            "aead open failed under every configured key (wrong key or AAD mismatch)",
        ))
    }
}

/// Build the transformer map from an EncryptionConfig spec.
///
/// Every `<resource>.<group>` selector in a selection shares that
/// selection's key list.
pub fn transformers_from_config(spec: &EncryptionConfigSpec) -> Result<TransformerMap, Error> {
    let mut map = TransformerMap::new();
    for selection in &spec.resources {
        let secrets: Vec<&str> = selection.keys.iter().map(|k| k.secret.as_str()).collect();
        let transformer: Arc<dyn Transformer> =
            Arc::new(AesGcmTransformer::from_base64_keys(&secrets)?);
        for group_resource in &selection.group_resources {
            map.insert(GroupResource::parse(group_resource), transformer.clone());
        }
    }
    Ok(map)
}

/// Decode an object file, opening its envelope when a transformer applies.
///
/// With a transformer the stored bytes are a JSON-encoded byte array holding
/// the sealed payload; without one they are plaintext JSON already. `object`
/// names the archive file for error reporting.
pub fn maybe_decrypt(
    bytes: Vec<u8>,
    transformer: Option<&Arc<dyn Transformer>>,
    aad: &str,
    object: &str,
) -> Result<Vec<u8>, Error> {
    let Some(transformer) = transformer else {
        return Ok(bytes);
    };
    let sealed: Vec<u8> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::decryption(object, format!("sealed payload is not a JSON byte array: {}", e))
    })?;
    transformer
        .open(&sealed, aad.as_bytes())
        .map_err(|e| Error::decryption(object, e.to_string()))
}

/// Seal plaintext into the on-disk representation (JSON-encoded byte array).
///
/// Counterpart of [`maybe_decrypt`], kept symmetric with the backup engine's
/// encryption step.
pub fn seal_envelope(
    plaintext: &[u8],
    transformer: &Arc<dyn Transformer>,
    aad: &str,
) -> Result<Vec<u8>, Error> {
    let sealed = transformer.seal(plaintext, aad.as_bytes())?;
    serde_json::to_vec(&sealed)
        .map_err(|e| Error::serialization(format!("failed to encode sealed payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_common::crd::{EncryptionKey, ResourceSelection};

    fn test_key(fill: u8) -> String {
        BASE64.encode([fill; KEY_LEN])
    }

    fn transformer(fill: u8) -> Arc<dyn Transformer> {
        Arc::new(AesGcmTransformer::from_base64_keys(&[test_key(fill)]).expect("transformer"))
    }

    #[test]
    fn seal_open_round_trip_with_matching_aad() {
        let t = transformer(1);
        let sealed = t.seal(b"{\"kind\":\"Widget\"}", b"ns1#bar").expect("seal");
        let opened = t.open(&sealed, b"ns1#bar").expect("open");
        assert_eq!(opened, b"{\"kind\":\"Widget\"}");
    }

    #[test]
    fn open_rejects_wrong_aad() {
        // A ciphertext sealed for ns1/bar must not open as cluster-scoped bar
        let t = transformer(1);
        let sealed = t.seal(b"payload", b"ns1#bar").expect("seal");
        assert!(t.open(&sealed, b"bar").is_err());
    }

    #[test]
    fn open_rejects_wrong_key() {
        let sealed = transformer(1).seal(b"payload", b"aad").expect("seal");
        assert!(transformer(2).open(&sealed, b"aad").is_err());
    }

    #[test]
    fn open_succeeds_under_rotated_key() {
        let old = AesGcmTransformer::from_base64_keys(&[test_key(1)]).expect("old");
        let sealed = old.seal(b"payload", b"aad").expect("seal");

        // New primary key first, old key still listed
        let rotated =
            AesGcmTransformer::from_base64_keys(&[test_key(2), test_key(1)]).expect("rotated");
        assert_eq!(rotated.open(&sealed, b"aad").expect("open"), b"payload");
    }

    #[test]
    fn rejects_bad_key_material() {
        assert!(AesGcmTransformer::from_base64_keys(&["not-base64!!"]).is_err());
        assert!(AesGcmTransformer::from_base64_keys(&[BASE64.encode(b"short")]).is_err());
        assert!(AesGcmTransformer::new(vec![]).is_err());
    }

    #[test]
    fn maybe_decrypt_passes_clear_text_through() {
        let bytes = br#"{"kind":"Widget"}"#.to_vec();
        let out = maybe_decrypt(bytes.clone(), None, "w1", "w1.json").expect("clear");
        assert_eq!(out, bytes);
    }

    #[test]
    fn maybe_decrypt_opens_envelope_files() {
        let t = transformer(3);
        let stored = seal_envelope(br#"{"kind":"Widget"}"#, &t, "ns1#w1").expect("seal");

        let out = maybe_decrypt(stored.clone(), Some(&t), "ns1#w1", "w1.json").expect("open");
        assert_eq!(out, br#"{"kind":"Widget"}"#);

        // Same file, wrong AAD: decryption error naming the object
        let err = maybe_decrypt(stored, Some(&t), "w1", "w1.json").unwrap_err();
        assert!(matches!(err, Error::Decryption { .. }));
        assert_eq!(err.object(), Some("w1.json"));
    }

    #[test]
    fn maybe_decrypt_rejects_non_envelope_bytes() {
        let t = transformer(3);
        let err =
            maybe_decrypt(br#"{"kind":"Widget"}"#.to_vec(), Some(&t), "w1", "w1.json").unwrap_err();
        assert!(matches!(err, Error::Decryption { .. }));
    }

    #[test]
    fn config_maps_every_selector_to_its_keys() {
        let spec = EncryptionConfigSpec {
            resources: vec![ResourceSelection {
                group_resources: vec![
                    "secrets".to_string(),
                    "catalogs.management.example.io".to_string(),
                ],
                keys: vec![EncryptionKey {
                    name: "key-1".to_string(),
                    secret: test_key(9),
                }],
            }],
        };
        let map = transformers_from_config(&spec).expect("map");
        assert_eq!(map.len(), 2);
        assert!(map.contains_key(&GroupResource::parse("secrets")));
        assert!(map.contains_key(&GroupResource::parse("catalogs.management.example.io")));
    }
}

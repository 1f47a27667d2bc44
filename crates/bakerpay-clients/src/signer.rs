// Signer backends: a local ed25519 private key file and a remote HTTP
// signer addressed as `url@pkh`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use ed25519_dalek::{Signer as _, SigningKey};

use bakerpay_core::address::{Address, AddressKind};
use bakerpay_core::engines::SignerEngine;
use bakerpay_core::enums::WalletMode;
use bakerpay_core::error::{PayoutError, Result};
use bakerpay_core::ops::Operation;

pub const PRIVATE_KEY_FILE: &str = "payout_wallet.key";
pub const REMOTE_SPECS_FILE: &str = "remote_signer.toml";

/// Base58check prefixes of the ed25519 key material.
const PREFIX_SEED: [u8; 4] = [13, 15, 58, 7]; // edsk (seed form)
const PREFIX_PUBLIC_KEY: [u8; 4] = [13, 15, 37, 217]; // edpk
const PREFIX_SIGNATURE: [u8; 5] = [9, 245, 205, 134, 18]; // edsig

fn blake2b(data: &[u8], out_len: usize) -> Vec<u8> {
    let mut hasher = Blake2bVar::new(out_len).expect("valid blake2b length");
    hasher.update(data);
    let mut out = vec![0u8; out_len];
    hasher
        .finalize_variable(&mut out)
        .expect("matching output length");
    out
}

fn b58check(prefix: &[u8], payload: &[u8]) -> String {
    let mut raw = Vec::with_capacity(prefix.len() + payload.len());
    raw.extend_from_slice(prefix);
    raw.extend_from_slice(payload);
    bs58::encode(raw).with_check().into_string()
}

fn address_of_public_key(public_key: &[u8]) -> Address {
    let digest = blake2b(public_key, 20);
    let mut payload = [0u8; 20];
    payload.copy_from_slice(&digest);
    Address::from_payload(AddressKind::Tz1, &payload)
}

/// Digest covered by the operation signature.
fn signing_digest(op: &Operation) -> Vec<u8> {
    blake2b(&op.to_signing_bytes(), 32)
}

pub struct InMemorySigner {
    key: SigningKey,
    address: Address,
    public_key: String,
}

impl InMemorySigner {
    /// Accepts a base58check seed ("edsk...") or a 64-char hex seed.
    pub fn from_key(raw: &str) -> Result<InMemorySigner> {
        let raw = raw.trim();
        let seed: [u8; 32] = if raw.starts_with("edsk") {
            let bytes = bs58::decode(raw)
                .with_check(None)
                .into_vec()
                .map_err(|e| PayoutError::Signer(format!("invalid private key: {}", e)))?;
            if bytes.len() != 4 + 32 || bytes[..4] != PREFIX_SEED {
                return Err(PayoutError::Signer(
                    "private key is not an ed25519 seed".to_string(),
                ));
            }
            bytes[4..].try_into().expect("length checked")
        } else {
            let bytes = hex::decode(raw)
                .map_err(|e| PayoutError::Signer(format!("invalid private key hex: {}", e)))?;
            bytes
                .try_into()
                .map_err(|_| PayoutError::Signer("hex seed must be 32 bytes".to_string()))?
        };
        let key = SigningKey::from_bytes(&seed);
        let verifying = key.verifying_key();
        Ok(InMemorySigner {
            address: address_of_public_key(verifying.as_bytes()),
            public_key: b58check(&PREFIX_PUBLIC_KEY, verifying.as_bytes()),
            key,
        })
    }
}

#[async_trait]
impl SignerEngine for InMemorySigner {
    fn pkh(&self) -> Address {
        self.address.clone()
    }

    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn sign(&self, op: &mut Operation) -> Result<()> {
        let signature = self.key.sign(&signing_digest(op));
        op.signature = Some(b58check(&PREFIX_SIGNATURE, &signature.to_bytes()));
        Ok(())
    }
}

pub struct RemoteSigner {
    url: String,
    address: Address,
    public_key: String,
    http: reqwest::Client,
}

impl RemoteSigner {
    /// Connects to the signer and resolves the key's public part.
    pub async fn connect(url: &str, pkh: &str) -> Result<RemoteSigner> {
        let address = Address::parse(pkh)
            .map_err(|e| PayoutError::Signer(format!("invalid signer pkh '{}': {}", pkh, e)))?;
        let url = url.trim_end_matches('/').to_string();
        let http = reqwest::Client::new();
        let response = http
            .get(format!("{}/keys/{}", url, address))
            .send()
            .await
            .map_err(|e| PayoutError::Signer(format!("remote signer unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(PayoutError::Signer(format!(
                "remote signer returned {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PayoutError::Signer(format!("malformed signer response: {}", e)))?;
        let public_key = body["public_key"]
            .as_str()
            .ok_or_else(|| PayoutError::Signer("signer returned no public key".to_string()))?
            .to_string();
        Ok(RemoteSigner {
            url,
            address,
            public_key,
            http,
        })
    }
}

#[async_trait]
impl SignerEngine for RemoteSigner {
    fn pkh(&self) -> Address {
        self.address.clone()
    }

    fn public_key(&self) -> String {
        self.public_key.clone()
    }

    async fn sign(&self, op: &mut Operation) -> Result<()> {
        let payload = hex::encode(signing_digest(op));
        let response = self
            .http
            .post(format!("{}/keys/{}", self.url, self.address))
            .json(&serde_json::json!(payload))
            .send()
            .await
            .map_err(|e| PayoutError::Signer(format!("remote signing failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(PayoutError::Signer(format!(
                "remote signer refused to sign: {}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PayoutError::Signer(format!("malformed signer response: {}", e)))?;
        let signature = body["signature"]
            .as_str()
            .ok_or_else(|| PayoutError::Signer("signer returned no signature".to_string()))?;
        op.signature = Some(signature.to_string());
        Ok(())
    }
}

/// Load the signer per wallet mode, or from an explicit spec string
/// (`key:<private key>` or `remote:<url>@<pkh>`).
pub async fn load_signer(
    wallet_mode: WalletMode,
    workdir: &Path,
    spec_override: Option<&str>,
) -> Result<Arc<dyn SignerEngine>> {
    if let Some(spec) = spec_override {
        return load_signer_from_spec(spec).await;
    }
    match wallet_mode {
        WalletMode::LocalPrivateKey => {
            let path = workdir.join(PRIVATE_KEY_FILE);
            log::debug!("loading private key from '{}'", path.display());
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                PayoutError::Signer(format!("failed to read '{}': {}", path.display(), e))
            })?;
            Ok(Arc::new(InMemorySigner::from_key(&raw)?))
        }
        WalletMode::RemoteSigner => {
            let path = workdir.join(REMOTE_SPECS_FILE);
            log::debug!("loading remote signer specs from '{}'", path.display());
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                PayoutError::Signer(format!("failed to read '{}': {}", path.display(), e))
            })?;
            #[derive(serde::Deserialize)]
            struct RemoteSpecs {
                url: String,
                pkh: String,
            }
            let specs: RemoteSpecs = toml::from_str(&raw)
                .map_err(|e| PayoutError::Signer(format!("invalid remote specs: {}", e)))?;
            Ok(Arc::new(RemoteSigner::connect(&specs.url, &specs.pkh).await?))
        }
    }
}

pub async fn load_signer_from_spec(spec: &str) -> Result<Arc<dyn SignerEngine>> {
    if let Some(key) = spec.strip_prefix("key:") {
        return Ok(Arc::new(InMemorySigner::from_key(key)?));
    }
    if let Some(remote) = spec.strip_prefix("remote:") {
        let (url, pkh) = remote.split_once('@').ok_or_else(|| {
            PayoutError::Signer(format!("invalid remote specs '{}' (expected url@pkh)", remote))
        })?;
        return Ok(Arc::new(RemoteSigner::connect(url, pkh).await?));
    }
    Err(PayoutError::Signer(format!(
        "invalid payout wallet specification: '{}'",
        spec
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    #[tokio::test]
    async fn test_sign_and_verify_roundtrip() {
        let signer = InMemorySigner::from_key(SEED_HEX).unwrap();
        let mut op = Operation::new().with_source(signer.pkh());
        signer.sign(&mut op).await.unwrap();

        let encoded = op.signature.clone().unwrap();
        assert!(encoded.starts_with("edsig"), "got {}", encoded);
        let raw = bs58::decode(&encoded).with_check(None).into_vec().unwrap();
        let sig_bytes: [u8; 64] = raw[5..].try_into().unwrap();
        let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

        let key = SigningKey::from_bytes(&hex::decode(SEED_HEX).unwrap().try_into().unwrap());
        key.verifying_key()
            .verify(&signing_digest(&op), &signature)
            .unwrap();
    }

    #[test]
    fn test_pkh_is_stable_and_valid() {
        let a = InMemorySigner::from_key(SEED_HEX).unwrap();
        let b = InMemorySigner::from_key(SEED_HEX).unwrap();
        assert_eq!(a.pkh(), b.pkh());
        assert!(a.pkh().as_str().starts_with("tz1"));
        assert!(Address::parse(a.pkh().as_str()).is_ok());
    }

    #[test]
    fn test_public_key_encoding() {
        let signer = InMemorySigner::from_key(SEED_HEX).unwrap();
        assert!(signer.public_key().starts_with("edpk"));
    }

    #[test]
    fn test_edsk_roundtrip() {
        let seed: [u8; 32] = hex::decode(SEED_HEX).unwrap().try_into().unwrap();
        let edsk = b58check(&PREFIX_SEED, &seed);
        assert!(edsk.starts_with("edsk"), "got {}", edsk);
        let from_edsk = InMemorySigner::from_key(&edsk).unwrap();
        let from_hex = InMemorySigner::from_key(SEED_HEX).unwrap();
        assert_eq!(from_edsk.pkh(), from_hex.pkh());
    }

    #[test]
    fn test_reject_bad_keys() {
        assert!(InMemorySigner::from_key("not-a-key").is_err());
        assert!(InMemorySigner::from_key("deadbeef").is_err());
    }

    #[tokio::test]
    async fn test_spec_parsing() {
        assert!(load_signer_from_spec(&format!("key:{}", SEED_HEX))
            .await
            .is_ok());
        assert!(load_signer_from_spec("remote:no-at-sign").await.is_err());
        assert!(load_signer_from_spec("bogus").await.is_err());
    }
}

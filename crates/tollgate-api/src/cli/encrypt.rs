//! `tollgate encrypt`: seal a string for the holder of an RSA private key.

use std::path::Path;

use anyhow::Context;

use tollgate_infra::crypto::sealed::{EncryptionFormat, PublicKey};

pub async fn encrypt(public_key: &Path, format: &str, text: &str) -> anyhow::Result<()> {
    let format: EncryptionFormat = format.parse()?;
    let pem = tokio::fs::read_to_string(public_key)
        .await
        .with_context(|| format!("failed to read public key {}", public_key.display()))?;
    let key = PublicKey::from_pem(&pem)?;

    println!("{}", key.encrypt_string(text, format)?);
    Ok(())
}

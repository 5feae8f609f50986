use std::convert::TryInto;
use std::fs;
use std::path::Path;

use crate::error::SecurityError;

const INSTALLATION_SECRET: &str = "password.secret";
const USER_AUTH_PUBLIC: &str = "user_auth.pem.pub";
const USER_AUTH_PRIVATE: &str = "user_auth.pem";

pub const DEFAULT_KEY_BITS: usize = 4096;

pub type Secret = [u8; 16];

#[derive(Clone)]
pub struct KeySet {
    pub public: Vec<u8>,
    pub private: Vec<u8>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeySet(public: {} bytes)", self.public.len())
    }
}

/// Installation secrets: the password pepper and the JWT signing keys.
#[derive(Clone)]
pub struct Security {
    pub secret: Secret,
    pub jwt_keys: KeySet,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("jwt_keys", &self.jwt_keys)
            .finish_non_exhaustive()
    }
}

impl Security {
    pub fn load(dir: impl AsRef<Path>) -> Result<Security, SecurityError> {
        Security::load_with_key_size(dir, DEFAULT_KEY_BITS)
    }

    pub fn load_with_key_size(
        dir: impl AsRef<Path>,
        key_bits: usize,
    ) -> Result<Security, SecurityError> {
        let dir = dir.as_ref();

        if cfg!(feature = "generate-security") {
            fs::create_dir_all(dir)?;
        }

        tracing::info!("Loading installation secret...");
        let stored: Option<Secret> = fs::read(dir.join(INSTALLATION_SECRET))
            .ok()
            .and_then(|s| s.try_into().ok());

        let secret = match stored {
            Some(secret) => {
                tracing::info!("Installation secret found and loaded.");
                secret
            }
            None => {
                tracing::info!(
                    "Secret not found in '{}'.",
                    dir.join(INSTALLATION_SECRET).display()
                );
                if !cfg!(feature = "generate-security") {
                    return Err(SecurityError::Missing(INSTALLATION_SECRET.to_string()));
                }
                tracing::info!("Generating a new installation secret.");
                let secret: Secret = rand::random();
                fs::write(dir.join(INSTALLATION_SECRET), secret)?;
                secret
            }
        };

        tracing::info!("Loading JWT signing keys...");
        let pub_key = fs::read(dir.join(USER_AUTH_PUBLIC)).ok();
        let priv_key = fs::read(dir.join(USER_AUTH_PRIVATE)).ok();

        let jwt_keys = match (pub_key, priv_key) {
            (Some(public), Some(private)) if !public.is_empty() && !private.is_empty() => {
                tracing::info!("Loaded JWT keys.");
                KeySet { public, private }
            }
            _ => generate_keys(dir, key_bits)?,
        };

        Ok(Security { secret, jwt_keys })
    }
}

#[cfg(feature = "generate-security")]
fn generate_keys(dir: &Path, key_bits: usize) -> Result<KeySet, SecurityError> {
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};

    tracing::info!("Unable to load private and/or public user auth key(s). Generating a new pair.");

    tracing::info!(
        "Generating a {} bit private RSA key. This might take a while...",
        key_bits
    );
    let mut rng = rand::thread_rng();
    let rsa_sk = rsa::RsaPrivateKey::new(&mut rng, key_bits)
        .map_err(|e| SecurityError::Generate(e.to_string()))?;

    tracing::info!("Creating PS256 private key...");
    let private = rsa_sk
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| SecurityError::Generate(e.to_string()))?
        .to_string()
        .into_bytes();
    fs::write(dir.join(USER_AUTH_PRIVATE), private.as_slice())?;

    tracing::info!("Creating PS256 public key...");
    let public = rsa_sk
        .to_public_key()
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| SecurityError::Generate(e.to_string()))?
        .into_bytes();
    fs::write(dir.join(USER_AUTH_PUBLIC), public.as_slice())?;

    tracing::info!("Done generating JWT keys.");

    Ok(KeySet { public, private })
}

#[cfg(not(feature = "generate-security"))]
fn generate_keys(_dir: &Path, _key_bits: usize) -> Result<KeySet, SecurityError> {
    Err(SecurityError::Missing(
        "private and/or public user auth key(s)".to_string(),
    ))
}

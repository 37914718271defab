use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use std::str::FromStr;

/// An EVM identity: secp256k1 key plus its derived address. The secret is
/// kept inside the signer and only exported for persistence.
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Fresh random keypair. The signer draws from the OS CSPRNG; these
    /// keys have custodial value.
    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Reconstructs an identity from a stored hex secret, with or without
    /// the 0x prefix.
    pub fn from_private_key(key: &str) -> Result<Self> {
        let trimmed = key.trim().trim_start_matches("0x");
        let signer = PrivateKeySigner::from_str(trimmed).context("invalid private key")?;
        Ok(Self { signer })
    }

    /// Checksummed 0x address.
    pub fn address(&self) -> String {
        self.signer.address().to_string()
    }

    /// Abbreviated address for logs; the full secret never appears there.
    pub fn short_address(&self) -> String {
        short(&self.address())
    }

    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.credential().to_bytes()))
    }

    /// Signs the authentication challenge for `nonce` (EIP-191 personal
    /// sign) and returns the 65-byte signature as 0x-hex. Local operation,
    /// never retried: failure means the identity itself is unusable.
    pub fn sign_auth_message(&self, nonce: &str) -> Result<String> {
        let message = auth_message(nonce);
        let signature = self
            .signer
            .sign_message_sync(message.as_bytes())
            .context("failed to sign challenge")?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

/// Fixed challenge template the verify endpoint expects.
pub fn auth_message(nonce: &str) -> String {
    format!("Sign this message to authenticate: {nonce}")
}

pub fn short(address: &str) -> String {
    if address.len() <= 10 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

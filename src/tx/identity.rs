//! Signing identity: a private key and the address derived from it

use crate::error::{SubmitterError, SubmitterResult};

use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::Address;
use std::fmt;

/// Length of a hex private key without prefix
pub const PRIVATE_KEY_HEX_LEN: usize = 64;

/// Private key plus derived public address.
///
/// Owned by the caller and never persisted. `Debug` prints only the address.
#[derive(Clone)]
pub struct SigningIdentity {
    wallet: LocalWallet,
}

impl SigningIdentity {
    /// Parse a 64 character hex private key (no `0x` prefix).
    ///
    /// Fails with `InvalidInput` if the key has the wrong length, is not hex,
    /// or is not a valid secp256k1 scalar.
    pub fn from_hex(private_key_hex: &str) -> SubmitterResult<Self> {
        let key = private_key_hex.trim();

        if key.len() != PRIVATE_KEY_HEX_LEN {
            return Err(SubmitterError::InvalidInput(format!(
                "private key must be {} hex characters without 0x prefix",
                PRIVATE_KEY_HEX_LEN
            )));
        }

        let bytes = hex::decode(key).map_err(|e| {
            SubmitterError::InvalidInput(format!("private key is not valid hex: {}", e))
        })?;

        let wallet = LocalWallet::from_bytes(&bytes).map_err(|e| {
            SubmitterError::InvalidInput(format!("private key is not a valid scalar: {}", e))
        })?;

        Ok(Self { wallet })
    }

    /// Public address derived from the key
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub(crate) fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

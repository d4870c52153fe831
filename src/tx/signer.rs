//! Network-bound transaction signing
//!
//! Signatures follow EIP-155: the network id is mixed into the signed hash and
//! into `v`, so bytes signed for one network never validate on another.

use super::broadcast::content_hash;
use super::builder::UnsignedTransaction;
use super::identity::SigningIdentity;
use crate::error::{SubmitterError, SubmitterResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, NameOrAddress, Signature, H256, U256};
use ethers::utils::rlp::Rlp;

/// A signed transaction bound to one network
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    network_id: u64,
    signature: Signature,
    raw: Bytes,
}

impl SignedTransaction {
    /// Canonical signed encoding, as broadcast
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    /// Content hash of the signed bytes
    pub fn transaction_id(&self) -> H256 {
        content_hash(&self.raw)
    }
}

/// A signed encoding taken apart again
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransaction {
    /// Fields as signed, with `from` recovered from the signature
    pub transaction: UnsignedTransaction,
    pub network_id: u64,
    pub signature: Signature,
}

/// Produces and checks network-bound signatures
pub struct Signer;

impl Signer {
    /// Sign `unsigned` for `network_id`.
    ///
    /// Pure: no I/O, no state. The transaction's `from` must be the identity's
    /// address.
    pub fn sign(
        unsigned: &UnsignedTransaction,
        identity: &SigningIdentity,
        network_id: u64,
    ) -> SubmitterResult<SignedTransaction> {
        if unsigned.from != identity.address() {
            return Err(SubmitterError::InvalidInput(format!(
                "transaction sender {:?} does not match signing identity {:?}",
                unsigned.from,
                identity.address()
            )));
        }

        let typed: TypedTransaction = unsigned.to_request(network_id).into();
        let signature = identity
            .wallet()
            .sign_transaction_sync(&typed)
            .map_err(|e| SubmitterError::InvalidInput(format!("signing failed: {}", e)))?;
        let raw = typed.rlp_signed(&signature);

        Ok(SignedTransaction {
            unsigned: unsigned.clone(),
            network_id,
            signature,
            raw,
        })
    }

    /// Decode a signed encoding and recover its sender
    pub fn decode(raw: &[u8]) -> SubmitterResult<DecodedTransaction> {
        let (typed, signature) = TypedTransaction::decode_signed(&Rlp::new(raw))
            .map_err(|e| SubmitterError::InvalidInput(format!("undecodable transaction: {}", e)))?;

        let network_id = network_id_from_v(signature.v).ok_or_else(|| {
            SubmitterError::InvalidInput("signature is not bound to a network".to_string())
        })?;

        let from = recover_signer(&typed, &signature, network_id)?;

        let request = match typed {
            TypedTransaction::Legacy(request) => request,
            _ => {
                return Err(SubmitterError::InvalidInput(
                    "unsupported transaction envelope".to_string(),
                ))
            }
        };

        let to = match request.to {
            Some(NameOrAddress::Address(address)) => Some(address),
            Some(NameOrAddress::Name(name)) => {
                return Err(SubmitterError::InvalidInput(format!(
                    "unresolved recipient name {}",
                    name
                )))
            }
            None => None,
        };

        let transaction = UnsignedTransaction {
            from,
            to,
            value: request.value.unwrap_or_default(),
            gas_limit: fit_u64(request.gas.unwrap_or_default(), "gas limit")?,
            fee_per_unit: request.gas_price.unwrap_or_default(),
            nonce: fit_u64(request.nonce.unwrap_or_default(), "nonce")?,
            payload: request.data.filter(|d| !d.is_empty()),
        };

        Ok(DecodedTransaction {
            transaction,
            network_id,
            signature,
        })
    }

    /// Check that `raw` is a valid signature for `network_id` and return the signer.
    ///
    /// Bytes signed for any other network fail with `InvalidInput`.
    pub fn verify(raw: &[u8], network_id: u64) -> SubmitterResult<Address> {
        let (typed, signature) = TypedTransaction::decode_signed(&Rlp::new(raw))
            .map_err(|e| SubmitterError::InvalidInput(format!("undecodable transaction: {}", e)))?;

        if network_id_from_v(signature.v) != Some(network_id) {
            return Err(SubmitterError::InvalidInput(format!(
                "signature is not bound to network {}",
                network_id
            )));
        }

        recover_signer(&typed, &signature, network_id)
    }
}

/// Narrow a decoded field that the ledger bounds to 64 bits
fn fit_u64(value: U256, field: &str) -> SubmitterResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(SubmitterError::InvalidInput(format!(
            "{} {} does not fit in 64 bits",
            field, value
        )));
    }
    Ok(value.as_u64())
}

/// Recover the sender as if the transaction had been signed for `network_id`
fn recover_signer(
    typed: &TypedTransaction,
    signature: &Signature,
    network_id: u64,
) -> SubmitterResult<Address> {
    let mut unsigned = typed.clone();
    unsigned.set_chain_id(network_id);

    signature
        .recover(unsigned.sighash())
        .map_err(|e| SubmitterError::InvalidInput(format!("bad signature: {}", e)))
}

/// EIP-155 `v = network_id * 2 + 35 + parity`; 27/28 carry no network id
fn network_id_from_v(v: u64) -> Option<u64> {
    if v >= 35 {
        Some((v - 35) / 2)
    } else {
        None
    }
}

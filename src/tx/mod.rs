//! Transaction submission module: identity, nonce sequencing, fees, signing and broadcast

mod broadcast;
mod builder;
mod gas;
mod identity;
mod nonce;
mod sender;
mod signer;

pub use broadcast::{content_hash, Broadcaster};
pub use builder::{
    parse_address, parse_amount, TransactionBuilder, TransactionKind, UnsignedTransaction,
};
pub use gas::{
    max_fee, FeeEstimator, CONTRACT_CALL_GAS_LIMIT, DEPLOY_GAS_LIMIT, TRANSFER_GAS_LIMIT,
};
pub use identity::{SigningIdentity, PRIVATE_KEY_HEX_LEN};
pub use nonce::{NonceSequencer, SubmissionPermit};
pub use sender::{Submission, TransactionSubmitter};
pub use signer::{DecodedTransaction, SignedTransaction, Signer};

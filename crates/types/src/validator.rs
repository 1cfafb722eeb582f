//! Validator registry entry.

use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use tree_hash_derive::TreeHash;

use crate::{
    Gwei, Hash256,
    chain_spec::ChainSpec,
    crypto::BlsPublicKey,
    slot::{Epoch, FAR_FUTURE_EPOCH},
};

/// A registered validator. Lifecycle epochs start at [`FAR_FUTURE_EPOCH`] and
/// are scheduled by the epoch-boundary registry sweep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Encode, Decode, TreeHash)]
pub struct Validator {
    pub pubkey: BlsPublicKey,
    pub withdrawal_credentials: Hash256,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Validator {
    /// New registry entry for a fresh deposit. The effective balance is the
    /// deposit amount rounded down to the increment and capped at the maximum.
    pub fn from_deposit(
        pubkey: BlsPublicKey,
        withdrawal_credentials: Hash256,
        amount: Gwei,
        spec: &ChainSpec,
    ) -> Self {
        let effective_balance = std::cmp::min(
            amount - amount % spec.effective_balance_increment,
            spec.max_effective_balance,
        );

        Self {
            pubkey,
            withdrawal_credentials,
            effective_balance,
            slashed: false,
            activation_eligibility_epoch: FAR_FUTURE_EPOCH,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    pub fn is_active_at(&self, epoch: Epoch) -> bool {
        self.activation_epoch <= epoch && epoch < self.exit_epoch
    }

    /// Eligible to be queued for activation.
    pub fn is_eligible_for_activation_queue(&self, spec: &ChainSpec) -> bool {
        self.activation_eligibility_epoch == FAR_FUTURE_EPOCH &&
            self.effective_balance >= spec.min_activation_balance
    }

    /// Has an ETH1-style withdrawal credential (0x01 prefix).
    pub fn has_eth1_withdrawal_credential(&self) -> bool {
        self.withdrawal_credentials[0] == 0x01
    }

    /// Exited, past the withdrawable epoch and still holding a balance.
    pub fn is_fully_withdrawable_at(&self, balance: Gwei, epoch: Epoch) -> bool {
        self.has_eth1_withdrawal_credential() && self.withdrawable_epoch <= epoch && balance > 0
    }

    /// At the effective-balance ceiling with excess actual balance on top.
    pub fn is_partially_withdrawable(&self, balance: Gwei, spec: &ChainSpec) -> bool {
        self.has_eth1_withdrawal_credential() &&
            self.effective_balance == spec.max_effective_balance &&
            balance > spec.max_effective_balance
    }

    /// Execution address encoded in an eth1 withdrawal credential.
    pub fn withdrawal_address(&self) -> crate::ExecutionAddress {
        crate::ExecutionAddress::from_slice(&self.withdrawal_credentials[12..])
    }
}

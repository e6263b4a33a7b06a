//! # Committee Roster
//!
//! Pairs each committee member with its `signer` and `valid` flags taken
//! from the commitment, so member identity and bitset position can never
//! drift apart.

use serde::{Deserialize, Serialize};

use shared_types::{Hash, ProTxHash};

use super::commitment::FinalCommitment;
use super::keys::BlsPublicKey;

/// Entry of the deterministic masternode list as seen at some block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasternodeEntry {
    /// Provider registration hash.
    pub pro_tx_hash: ProTxHash,
    /// Hash of the block that confirmed the registration (null while unconfirmed).
    pub confirmed_hash: Hash,
    /// Operator BLS key; signs DKG messages and receives encrypted contributions.
    pub operator_public_key: BlsPublicKey,
    /// False once the masternode is PoSe-banned.
    pub is_valid: bool,
}

/// One committee slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// The member occupying the slot.
    pub member: MasternodeEntry,
    /// Member contributed to `members_sig`.
    pub signer: bool,
    /// Member's DKG contribution was verified.
    pub valid: bool,
}

/// Ordered committee with commitment flags.
#[derive(Debug, Clone, Default)]
pub struct CommitteeRoster {
    entries: Vec<RosterEntry>,
}

impl CommitteeRoster {
    /// Pair members with the commitment's bitsets. Members beyond the bitset
    /// length get both flags cleared.
    pub fn new(members: Vec<MasternodeEntry>, commitment: &FinalCommitment) -> Self {
        let entries = members
            .into_iter()
            .enumerate()
            .map(|(i, member)| RosterEntry {
                member,
                signer: commitment.signers.get(i).map(|b| *b).unwrap_or(false),
                valid: commitment.valid_members.get(i).map(|b| *b).unwrap_or(false),
            })
            .collect();
        Self { entries }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the committee is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot by index.
    pub fn get(&self, index: usize) -> Option<&RosterEntry> {
        self.entries.get(index)
    }

    /// All slots, in committee order.
    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    /// Committee members, in committee order.
    pub fn members(&self) -> impl Iterator<Item = &MasternodeEntry> {
        self.entries.iter().map(|e| &e.member)
    }

    /// Index of a member.
    pub fn member_index(&self, pro_tx_hash: &ProTxHash) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &e.member.pro_tx_hash == pro_tx_hash)
    }

    /// True if the masternode sits on the committee.
    pub fn is_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.member_index(pro_tx_hash).is_some()
    }

    /// True if the masternode sits on the committee with a verified contribution.
    pub fn is_valid_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.entries
            .iter()
            .any(|e| e.valid && &e.member.pro_tx_hash == pro_tx_hash)
    }

    /// Members with verified contributions, with their committee index.
    pub fn valid_members(&self) -> impl Iterator<Item = (usize, &MasternodeEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.valid)
            .map(|(i, e)| (i, &e.member))
    }

    /// Operator keys of all signers, in committee order.
    pub fn signer_keys(&self) -> Vec<BlsPublicKey> {
        self.entries
            .iter()
            .filter(|e| e.signer)
            .map(|e| e.member.operator_public_key)
            .collect()
    }
}

/// Serializable summary of a member used by diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberStatus {
    /// Hex-encoded provider registration hash.
    pub pro_tx_hash: String,
    /// Contributed to the member signature.
    pub signer: bool,
    /// Verified contribution.
    pub valid: bool,
}

impl From<&RosterEntry> for MemberStatus {
    fn from(entry: &RosterEntry) -> Self {
        Self {
            pro_tx_hash: hex::encode(entry.member.pro_tx_hash),
            signer: entry.signer,
            valid: entry.valid,
        }
    }
}

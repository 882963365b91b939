//! Quorum sealing — Shamir-split symmetric keys across members.
//!
//! Sealing serializes a value, encrypts it under a fresh symmetric key,
//! splits that key into one share per member (threshold `shares_required`),
//! and ECIES-encrypts each share for its member.  Unsealing needs any
//! threshold-sized subset of members with private keys loaded; the field
//! width is re-derived from the *original* member count recorded in the
//! share map, so records stay combinable as membership context changes.
//!
//! Share maps are `BTreeMap` keyed by the canonical member-id hex so the
//! serialized record is byte-stable regardless of insertion order.

use std::collections::BTreeMap;

use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::ecies::{self, EciesError};
use crate::crypto::shamir::{GfShamir, Share, ShamirError};
use crate::crypto::{self, CryptoError, SymmetricKey};
use crate::member::{member_id_hex, Member, MemberId};

/// Fewest members a quorum may have.
pub const MIN_SHARES: usize = 2;
/// Most members a quorum may have (2^20 − 1, the largest supported field).
pub const MAX_SHARES: usize = 1_048_575;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("Need at least {required} members with shares, got {provided}")]
    NotEnoughMembersToUnlock { required: usize, provided: usize },
    #[error("{0} members exceed the maximum of {MAX_SHARES}")]
    TooManyMembersToUnlock(usize),
    #[error("Invalid member array: {0}")]
    InvalidMemberArray(&'static str),
    #[error("Member {0} has no private key loaded")]
    MissingPrivateKeys(MemberId),
    #[error("No encrypted share recorded for member {0}")]
    EncryptedShareNotFound(MemberId),
    #[error("Member {0} is not part of this quorum record")]
    MemberNotFound(MemberId),
    #[error(transparent)]
    InvalidBitRange(#[from] ShamirError),
    #[error("Sealing operation failed: {source}")]
    FailedToSeal {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<CryptoError> for QuorumError {
    fn from(e: CryptoError) -> Self {
        QuorumError::FailedToSeal { source: Box::new(e) }
    }
}

impl From<EciesError> for QuorumError {
    fn from(e: EciesError) -> Self {
        QuorumError::FailedToSeal { source: Box::new(e) }
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// A sealed value plus the per-member key shares needed to open it.
///
/// Member ids appear as bare 32-char hex, matching the share-map keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumDataRecord {
    #[serde(with = "uuid_hex")]
    pub agent_id:        MemberId,
    #[serde(with = "uuid_hex_seq")]
    pub member_ids:      Vec<MemberId>,
    pub shares_required: u32,
    #[serde(with = "hex::serde")]
    pub encrypted_data:  Vec<u8>,
    /// Canonical map: member-id hex → ECIES-encrypted share bytes.
    pub encrypted_shares_by_member_id: BTreeMap<String, EncryptedShare>,
}

mod uuid_hex {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Uuid, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.simple().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Uuid, D::Error> {
        Uuid::parse_str(&String::deserialize(d)?).map_err(D::Error::custom)
    }
}

mod uuid_hex_seq {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(ids: &[Uuid], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(ids.len()))?;
        for id in ids {
            seq.serialize_element(&id.simple().to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Uuid>, D::Error> {
        Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| Uuid::parse_str(s).map_err(D::Error::custom))
            .collect()
    }
}

/// Hex-serialized share ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedShare(#[serde(with = "hex::serde")] pub Vec<u8>);

// ── Sealing ──────────────────────────────────────────────────────────────────

/// Field width for `n` participants: `max(3, ceil(log2(n)))`.
fn field_bits(n: usize) -> u32 {
    debug_assert!(n >= MIN_SHARES);
    let ceil_log2 = usize::BITS - (n - 1).leading_zeros();
    ceil_log2.max(3)
}

/// Seal `value` so that any `shares_required` of `members` can recover it.
///
/// `shares_required` defaults to all members.
pub fn seal<T: Serialize>(
    agent:           &Member,
    value:           &T,
    members:         &[Member],
    shares_required: Option<u32>,
) -> Result<QuorumDataRecord, QuorumError> {
    if members.len() < MIN_SHARES {
        return Err(QuorumError::InvalidMemberArray("fewer than 2 members"));
    }
    if members.len() > MAX_SHARES {
        return Err(QuorumError::TooManyMembersToUnlock(members.len()));
    }
    let distinct: std::collections::HashSet<MemberId> = members.iter().map(|m| m.id).collect();
    if distinct.len() != members.len() {
        return Err(QuorumError::InvalidMemberArray("duplicate member ids"));
    }
    let shares_required = shares_required.unwrap_or(members.len() as u32);
    if (shares_required as usize) < MIN_SHARES || shares_required as usize > members.len() {
        return Err(QuorumError::InvalidMemberArray(
            "threshold outside [2, member count]",
        ));
    }

    let (key, encrypted_data) = crypto::seal_json(value)?;

    let gf = GfShamir::new(field_bits(members.len()))?;
    let shares = gf
        .split(
            key.as_bytes(),
            members.len() as u32,
            shares_required,
            &mut OsRng,
        )
        .map_err(|e| QuorumError::FailedToSeal { source: Box::new(e) })?;

    let mut encrypted_shares_by_member_id = BTreeMap::new();
    for (member, share) in members.iter().zip(&shares) {
        let sealed_share = ecies::encrypt(&member.public_key, &share.to_bytes())?;
        encrypted_shares_by_member_id
            .insert(member_id_hex(&member.id), EncryptedShare(sealed_share));
    }

    Ok(QuorumDataRecord {
        agent_id: agent.id,
        member_ids: members.iter().map(|m| m.id).collect(),
        shares_required,
        encrypted_data,
        encrypted_shares_by_member_id,
    })
}

/// Recover the sealed value using any threshold-sized subset of members.
///
/// Every provided member must hold a private key; order does not matter.
pub fn unseal<T: DeserializeOwned>(
    record:  &QuorumDataRecord,
    members: &[Member],
) -> Result<T, QuorumError> {
    if members.len() < record.shares_required as usize {
        return Err(QuorumError::NotEnoughMembersToUnlock {
            required: record.shares_required as usize,
            provided: members.len(),
        });
    }
    for member in members {
        if !member.has_private_key() {
            return Err(QuorumError::MissingPrivateKeys(member.id));
        }
    }

    let mut shares = Vec::with_capacity(members.len());
    for member in members {
        if !record.member_ids.contains(&member.id) {
            return Err(QuorumError::MemberNotFound(member.id));
        }
        let sealed_share = record
            .encrypted_shares_by_member_id
            .get(&member_id_hex(&member.id))
            .ok_or(QuorumError::EncryptedShareNotFound(member.id))?;
        let secret_key = member
            .private_key()
            .ok_or(QuorumError::MissingPrivateKeys(member.id))?;
        let share_bytes = ecies::decrypt(secret_key, &sealed_share.0)?;
        shares.push(
            Share::from_bytes(&share_bytes)
                .map_err(|e| QuorumError::FailedToSeal { source: Box::new(e) })?,
        );
    }

    // The field width is a function of the original membership, not of the
    // subset presenting shares.
    let original_members = record.encrypted_shares_by_member_id.len();
    if original_members < MIN_SHARES {
        return Err(QuorumError::InvalidMemberArray("record holds fewer than 2 shares"));
    }
    let gf = GfShamir::new(field_bits(original_members))?;
    let key_bytes = gf
        .combine(&shares)
        .map_err(|e| QuorumError::FailedToSeal { source: Box::new(e) })?;
    let key = SymmetricKey::from_slice(&key_bytes)?;

    Ok(crypto::open_json(&record.encrypted_data, &key)?)
}

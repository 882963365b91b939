//! Member identity — the key-holding collaborator the engine consumes.
//!
//! A member is a 128-bit id plus a secp256k1 keypair.  The engine only ever
//! touches the public-key surface (ECIES envelopes, CBL signatures); the
//! secret key is optional so that quorum records can reference members whose
//! keys live elsewhere.

use rand::rngs::OsRng;
use secp256k1::{PublicKey, SecretKey, SECP256K1};
use uuid::Uuid;

/// Globally unique 128-bit member identifier.
pub type MemberId = Uuid;

/// Canonical hex form of a member id (32 lower-case hex chars, no dashes).
/// Quorum records key their share maps by this string.
pub fn member_id_hex(id: &MemberId) -> String {
    id.simple().to_string()
}

#[derive(Debug, Clone)]
pub struct Member {
    pub id:         MemberId,
    pub public_key: PublicKey,
    secret_key:     Option<SecretKey>,
}

impl Member {
    /// Create a member with a freshly generated keypair.
    pub fn generate() -> Self {
        let (secret_key, public_key) = SECP256K1.generate_keypair(&mut OsRng);
        Self {
            id: Uuid::new_v4(),
            public_key,
            secret_key: Some(secret_key),
        }
    }

    /// A member known only by id and public key.
    pub fn public_only(id: MemberId, public_key: PublicKey) -> Self {
        Self { id, public_key, secret_key: None }
    }

    #[inline]
    pub fn has_private_key(&self) -> bool {
        self.secret_key.is_some()
    }

    #[inline]
    pub fn private_key(&self) -> Option<&SecretKey> {
        self.secret_key.as_ref()
    }

    /// Drop the secret key, keeping the public surface.
    pub fn without_private_key(&self) -> Self {
        Self {
            id: self.id,
            public_key: self.public_key,
            secret_key: None,
        }
    }

    #[inline]
    pub fn id_hex(&self) -> String {
        member_id_hex(&self.id)
    }
}

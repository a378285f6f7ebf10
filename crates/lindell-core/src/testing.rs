//! Shared test fixtures

use crate::engine::{
    LindellEngine, PartialSignatureInput, RawSignature, Round1Result, Round2Result, SigningEngine,
};
use crate::paillier::DecryptionKey;
use crate::types::{point_from_bytes, point_to_bytes, KeyShare, SessionId, SigningParameters};
use crate::Result;
use k256::{elliptic_curve::{Field, PrimeField}, FieldBytes, ProjectivePoint, Scalar};
use num_bigint::BigUint;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// 1024-bit primes, giving a 2048-bit modulus
const PAILLIER_P: &[u8] = b"cb10fbd779594b1b628812f0d9765ec8f59c73e439fd9d9f731938e6a87010698b86e379e4433988acd741137d2079b776731adc66a9d2a95950be82cb93d3ea3eee10f12932645e16ae3f560872728c7a9336eea6d437ef020027eec0d35787b319877e7afbd6ec395be5d18d7b5c87ae653d1ad90ec1ddaaae8f2259c007ef";
const PAILLIER_Q: &[u8] = b"da75e962cf5b6a1ea3bdf904220f423e6de24d2c5a446a4b731eb2d416e58f6c4fdc343d92055902bf645576616414396a74bed134c875ddb0ed22378cb1d5e4f6cf62669150bf8995e37438004165be7b02c189d359db12df0f20753fb9e03fa4da230322248be43c9ce3bc7d523366d5c91c445031d25d2573f8ff113fa877";

const PAILLIER_P2: &[u8] = b"fa2d7c50c56293217acb33985cc9f7ef1d32090e8adb3817d6fba82e3703598ee20dd66cbf6384b37a1ba94d86408163c1c37ace9c714b5d83edcc4382a3d90332b113cb6173725bdbdfd26c3ceee56b5278a735047f02e3ac0f0353a33270c44717d2b3e1882479f312e9b062de3d8490447515a4f36f223a21b2d34869451d";
const PAILLIER_Q2: &[u8] = b"e3c051b4d46d384c4268759e8e0188cf9cee2a5255b853ebcd9f59b320ebbbf9de722cbc73e28a665ed6c2f04cbfc6869f1553e09634b2f7da5a7d68cbea6a7fb1cdeadbcaff6e16081bbd6b052baf06ab2fc02732a9f5cf32c8617834190e6126c21116568f56431861e48ee9ca22a271f577585bd95d2d2f539ae86ed2abc7";

/// Shares of `x = sha256("fixture-secret") mod q` on the line `x + a·id`
const FIXED_SHARE_1: &str = "e02b7dc630612eee7fb369eff1454c883d7eb9e51a5939458433acca5208c7dc";
const FIXED_SHARE_2: &str = "0c91bf83de3a15ebe436503a30901533c9d985d1202ac275733185c740eee880";
pub const FIXED_PUBLIC_KEY: &str =
    "030e41551d6edae76378fc7626e7dba2dd0bc7952281eeae2cf5109664c7e10633";

fn key_from_hex(p: &[u8], q: &[u8]) -> DecryptionKey {
    DecryptionKey::from_primes(
        BigUint::parse_bytes(p, 16).unwrap(),
        BigUint::parse_bytes(q, 16).unwrap(),
    )
    .unwrap()
}

pub fn paillier_key() -> DecryptionKey {
    static KEY: OnceLock<DecryptionKey> = OnceLock::new();
    KEY.get_or_init(|| key_from_hex(PAILLIER_P, PAILLIER_Q)).clone()
}

pub fn second_paillier_key() -> DecryptionKey {
    static KEY: OnceLock<DecryptionKey> = OnceLock::new();
    KEY.get_or_init(|| key_from_hex(PAILLIER_P2, PAILLIER_Q2)).clone()
}

fn scalar_from_hex(hex_str: &str) -> Scalar {
    let bytes = hex::decode(hex_str).unwrap();
    Option::<Scalar>::from(Scalar::from_repr(*FieldBytes::from_slice(&bytes))).unwrap()
}

/// Both parties' shares of one joint key
pub struct DealtShares {
    pub session_id: SessionId,
    pub server: KeyShare,
    pub client: KeyShare,
    pub public_key: ProjectivePoint,
}

impl DealtShares {
    pub fn server_params(&self) -> SigningParameters {
        SigningParameters::two_party(self.session_id, 0).unwrap()
    }

    pub fn client_params(&self) -> SigningParameters {
        SigningParameters::two_party(self.session_id, 1).unwrap()
    }
}

fn shares(
    session_id: SessionId,
    x1: Scalar,
    x2: Scalar,
    public_key: ProjectivePoint,
    chain_code: [u8; 32],
    paillier: DecryptionKey,
) -> DealtShares {
    let share_ids = vec![Scalar::from(1u64), Scalar::from(2u64)];
    let encoded = point_to_bytes(&public_key);

    DealtShares {
        session_id,
        server: KeyShare {
            party_id: 0,
            share_ids: share_ids.clone(),
            secret_share: x1,
            public_key: encoded.clone(),
            chain_code,
            paillier: Some(paillier),
        },
        client: KeyShare {
            party_id: 1,
            share_ids,
            secret_share: x2,
            public_key: encoded,
            chain_code,
            paillier: None,
        },
        public_key,
    }
}

/// Trusted-dealer shares from a seeded RNG
pub fn deal_shares_with_key(seed: u64, paillier: DecryptionKey) -> DealtShares {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let x = Scalar::random(&mut rng);
    let a = Scalar::random(&mut rng);

    let mut session_id = [0u8; 32];
    rng.fill_bytes(&mut session_id);
    let mut chain_code = [0u8; 32];
    rng.fill_bytes(&mut chain_code);

    shares(
        session_id,
        x + a,
        x + a * Scalar::from(2u64),
        ProjectivePoint::GENERATOR * x,
        chain_code,
        paillier,
    )
}

pub fn deal_shares(seed: u64) -> DealtShares {
    deal_shares_with_key(seed, paillier_key())
}

/// Hard-coded shares whose joint key is [`FIXED_PUBLIC_KEY`]
pub fn fixed_shares(session_id: SessionId) -> DealtShares {
    let public_key = point_from_bytes(&hex::decode(FIXED_PUBLIC_KEY).unwrap()).unwrap();
    shares(
        session_id,
        scalar_from_hex(FIXED_SHARE_1),
        scalar_from_hex(FIXED_SHARE_2),
        public_key,
        [0u8; 32],
        paillier_key(),
    )
}

/// Engine wrapper that counts calls
#[derive(Default)]
pub struct CountingEngine {
    inner: LindellEngine,
    pub ephemeral_calls: AtomicUsize,
    pub partial_calls: AtomicUsize,
    pub finalize_calls: AtomicUsize,
}

impl SigningEngine for CountingEngine {
    fn generate_ephemeral(&self) -> Result<Round1Result> {
        self.ephemeral_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate_ephemeral()
    }

    fn compute_partial_signature(&self, input: &PartialSignatureInput<'_>) -> Result<Round2Result> {
        self.partial_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compute_partial_signature(input)
    }

    fn finalize_signature(
        &self,
        plain_partial_signature: &BigUint,
        round1: &Round1Result,
        round2: &Round2Result,
    ) -> Result<RawSignature> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.finalize_signature(plain_partial_signature, round1, round2)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_shares_reconstruct_public_key() {
        let dealt = fixed_shares([0u8; 32]);
        let x = dealt.server.secret_share * Scalar::from(2u64) - dealt.client.secret_share;
        assert_eq!(ProjectivePoint::GENERATOR * x, dealt.public_key);
    }

    #[test]
    fn test_fixture_keys_meet_default_minimum() {
        let minimum = crate::CeremonyConfig::default().min_paillier_modulus_bits;
        for key in [paillier_key(), second_paillier_key()] {
            assert_eq!(key.n().bits(), 2048);
            assert!(key.n().bits() >= minimum);
        }
        assert_ne!(paillier_key().n(), second_paillier_key().n());
    }

    #[test]
    fn test_dealer_is_deterministic() {
        let a = deal_shares(1);
        let b = deal_shares(1);
        let c = deal_shares(2);

        assert_eq!(a.public_key, b.public_key);
        assert_eq!(a.session_id, b.session_id);
        assert_ne!(a.public_key, c.public_key);
    }
}

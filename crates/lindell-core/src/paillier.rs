//! Paillier keys for the ceremony, backed by `libpaillier`
//!
//! The server encrypts its share under its own key; the client evaluates the
//! partial signature homomorphically on that ciphertext; the server decrypts.
//! Integers cross this boundary as `BigUint` so the rounds never see
//! `BigNumber`.

use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

fn to_number(value: &BigUint) -> BigNumber {
    BigNumber::from_slice(value.to_bytes_be())
}

fn to_biguint(value: &BigNumber) -> BigUint {
    BigUint::from_bytes_be(&value.to_bytes())
}

/// Public half of a Paillier key
#[derive(Clone)]
pub struct EncryptionKey {
    inner: libpaillier::EncryptionKey,
    n: BigUint,
    nn: BigUint,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.n == other.n
    }
}

impl Eq for EncryptionKey {}

impl EncryptionKey {
    fn from_inner(inner: libpaillier::EncryptionKey) -> Result<Self> {
        let n = to_biguint(inner.n());
        if n <= BigUint::one() || n.is_even() {
            return Err(Error::Crypto("Paillier modulus must be odd and > 1".into()));
        }
        let nn = &n * &n;
        Ok(Self { inner, n, nn })
    }

    /// Parse a big-endian modulus
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = libpaillier::EncryptionKey::from_bytes(bytes)
            .map_err(|e| Error::Crypto(format!("Paillier modulus: {}", e)))?;
        let key = Self::from_inner(inner)?;
        if key.n != BigUint::from_bytes_be(bytes) {
            return Err(Error::Crypto("Paillier modulus did not round-trip".into()));
        }
        Ok(key)
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }

    pub fn nn(&self) -> &BigUint {
        &self.nn
    }

    pub fn bits(&self) -> u64 {
        self.n.bits()
    }

    /// Big-endian modulus
    pub fn to_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    /// `Enc(m)` with a fresh nonce from `Z*_n`
    pub fn encrypt<R: RngCore + CryptoRng>(&self, m: &BigUint, rng: &mut R) -> Result<BigUint> {
        let r = loop {
            let candidate = rng.gen_biguint_range(&BigUint::one(), &self.n);
            if candidate.gcd(&self.n).is_one() {
                break candidate;
            }
        };
        self.encrypt_with(m, &r)
    }

    /// Encrypt with caller-chosen nonce
    pub fn encrypt_with(&self, m: &BigUint, r: &BigUint) -> Result<BigUint> {
        if m >= &self.n {
            return Err(Error::Crypto("plaintext not below Paillier modulus".into()));
        }
        let (c, _) = self
            .inner
            .encrypt(m.to_bytes_be(), Some(to_number(r)))
            .ok_or_else(|| Error::Crypto("Paillier encryption rejected its inputs".into()))?;
        Ok(to_biguint(&c))
    }

    /// `Enc(a) ⊕ Enc(b) = Enc(a + b)`
    pub fn add(&self, c1: &BigUint, c2: &BigUint) -> Result<BigUint> {
        self.inner
            .add(&to_number(c1), &to_number(c2))
            .map(|c| to_biguint(&c))
            .ok_or_else(|| Error::Crypto("ciphertext out of range".into()))
    }

    /// `Enc(a) ⊗ k = Enc(a·k)`
    pub fn mul_plain(&self, c: &BigUint, k: &BigUint) -> Result<BigUint> {
        self.inner
            .mul(&to_number(c), &to_number(k))
            .map(|c| to_biguint(&c))
            .ok_or_else(|| Error::Crypto("ciphertext or scalar out of range".into()))
    }

    /// `c ∈ Z*_{n²}`
    pub fn is_valid_ciphertext(&self, c: &BigUint) -> bool {
        !c.is_zero() && c < &self.nn && c.gcd(&self.n).is_one()
    }
}

/// Private Paillier key, held by the server role only
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "DecryptionKeyRepr", into = "DecryptionKeyRepr")]
pub struct DecryptionKey {
    p: BigUint,
    q: BigUint,
    inner: libpaillier::DecryptionKey,
    public: EncryptionKey,
}

/// Serialized form: the two primes as hex
#[derive(Serialize, Deserialize)]
struct DecryptionKeyRepr {
    p: String,
    q: String,
}

impl TryFrom<DecryptionKeyRepr> for DecryptionKey {
    type Error = Error;

    fn try_from(repr: DecryptionKeyRepr) -> Result<Self> {
        let p = BigUint::parse_bytes(repr.p.as_bytes(), 16)
            .ok_or_else(|| Error::Deserialization("invalid Paillier prime p".into()))?;
        let q = BigUint::parse_bytes(repr.q.as_bytes(), 16)
            .ok_or_else(|| Error::Deserialization("invalid Paillier prime q".into()))?;
        DecryptionKey::from_primes(p, q)
    }
}

impl From<DecryptionKey> for DecryptionKeyRepr {
    fn from(key: DecryptionKey) -> Self {
        Self {
            p: key.p.to_str_radix(16),
            q: key.q.to_str_radix(16),
        }
    }
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("bits", &self.public.bits())
            .finish_non_exhaustive()
    }
}

impl DecryptionKey {
    /// Build a key from two distinct primes
    pub fn from_primes(p: BigUint, q: BigUint) -> Result<Self> {
        if p == q {
            return Err(Error::Crypto("Paillier primes must be distinct".into()));
        }
        let (pn, qn) = (to_number(&p), to_number(&q));
        if !pn.is_prime() || !qn.is_prime() {
            return Err(Error::Crypto("Paillier factors must be prime".into()));
        }

        let inner = libpaillier::DecryptionKey::with_primes_unchecked(&pn, &qn)
            .ok_or_else(|| Error::Crypto("degenerate Paillier primes".into()))?;
        let public = EncryptionKey::from_inner(libpaillier::EncryptionKey::from(&inner))?;

        Ok(Self { p, q, inner, public })
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.public
    }

    pub fn n(&self) -> &BigUint {
        self.public.n()
    }

    /// Recover the plaintext in `[0, n)`
    pub fn decrypt(&self, c: &BigUint) -> Result<BigUint> {
        if !self.public.is_valid_ciphertext(c) {
            return Err(Error::Decryption(
                "ciphertext out of range or not a unit mod n".into(),
            ));
        }
        self.inner
            .decrypt(&to_number(c))
            .map(|m| BigUint::from_bytes_be(&m))
            .ok_or_else(|| Error::Decryption("ciphertext rejected".into()))
    }
}

//! Turn a stored key share into this ceremony's additive signing share

use crate::types::{KeyShare, SigningParameters};
use crate::{Error, PartyId, Result};
use k256::{ProjectivePoint, Scalar};
use tracing::debug;

/// Signing material for one ceremony
pub struct PreparedShare {
    /// `w_i = λ_i · (x_i + delta)`
    pub signing_share: Scalar,
    /// `Q + delta·G`
    pub public_key: ProjectivePoint,
}

/// Lagrange coefficient at zero for `party_id` over the share ids of `parties`
pub fn lagrange_coefficient(
    party_id: PartyId,
    parties: &[PartyId],
    share_ids: &[Scalar],
) -> Result<Scalar> {
    let x_i = share_ids.get(party_id).ok_or(Error::InvalidPartyId(party_id))?;
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &j in parties {
        if j == party_id {
            continue;
        }
        let x_j = share_ids.get(j).ok_or(Error::InvalidPartyId(j))?;
        numerator *= x_j;
        denominator *= *x_j - x_i;
    }

    let inverse = Option::<Scalar>::from(denominator.invert())
        .ok_or_else(|| Error::InvalidConfig("duplicate share identifiers".into()))?;
    Ok(numerator * inverse)
}

/// Apply the derivation offset and the Lagrange coefficient to the share
pub fn prepare_for_signing(
    key: &KeyShare,
    params: &SigningParameters,
    derivation_path: Option<&str>,
) -> Result<PreparedShare> {
    if key.party_id != params.party_id {
        return Err(Error::InvalidConfig(format!(
            "key share belongs to party {}, parameters to party {}",
            key.party_id, params.party_id
        )));
    }
    if key.share_ids.len() < params.party_count {
        return Err(Error::ThresholdNotMet {
            required: params.party_count,
            actual: key.share_ids.len(),
        });
    }
    if params.is_server() && key.paillier.is_none() {
        return Err(Error::InvalidConfig("server key share has no Paillier key".into()));
    }

    let (delta, public_key) = match derivation_path {
        Some(path) => {
            let child = key.derive_child(path)?;
            (child.delta, child.public_key_point()?)
        }
        None => (Scalar::ZERO, key.public_key_point()?),
    };

    let lambda = lagrange_coefficient(params.party_id, &params.parties, &key.share_ids)?;
    debug!(
        party_id = params.party_id,
        derived = derivation_path.is_some(),
        "Prepared signing share"
    );

    Ok(PreparedShare {
        signing_share: lambda * (key.secret_share + delta),
        public_key,
    })
}

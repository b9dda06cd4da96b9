//! Sealing of the sensitive attempt fields under the server key.

use idv_crypto::{RandomSource, ServerKey};
use idv_types::SealedBlob;
use serde::{de::DeserializeOwned, Serialize};

use crate::FlowError;

pub fn seal<T: Serialize>(
    key: &ServerKey,
    value: &T,
    rng: &dyn RandomSource,
) -> Result<SealedBlob, FlowError> {
    let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(value)?);
    Ok(key.seal(&plaintext, rng)?)
}

pub fn open<T: DeserializeOwned>(key: &ServerKey, blob: &SealedBlob) -> Result<T, FlowError> {
    let plaintext = key.open(blob)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idv_nullables::NullRandom;
    use idv_types::Ssn;

    #[test]
    fn sealed_value_opens_only_with_its_key() {
        let rng = NullRandom::new(3);
        let key = ServerKey::new([1; 32]);
        let blob = seal(&key, &Ssn::new("123456789"), &rng).unwrap();
        assert!(!blob.ciphertext.windows(9).any(|w| w == b"123456789"));

        let opened: Ssn = open(&key, &blob).unwrap();
        assert_eq!(opened.expose(), "123456789");
        assert!(open::<Ssn>(&ServerKey::new([2; 32]), &blob).is_err());
    }
}

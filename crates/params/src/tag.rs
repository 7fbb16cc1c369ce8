use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

use crate::{STAKING_TAG_LEN, errors::ParamsError};

/// Protocol tag prefixed to the data-embed output of observable staking transactions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StakingTag([u8; STAKING_TAG_LEN]);

impl StakingTag {
    pub const fn new(bytes: [u8; STAKING_TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; STAKING_TAG_LEN] {
        &self.0
    }
}

impl From<[u8; STAKING_TAG_LEN]> for StakingTag {
    fn from(value: [u8; STAKING_TAG_LEN]) -> Self {
        Self(value)
    }
}

impl fmt::Display for StakingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for StakingTag {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| ParamsError::InvalidTag(e.to_string()))?;
        let bytes: [u8; STAKING_TAG_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            ParamsError::InvalidTag(format!(
                "expected {STAKING_TAG_LEN} bytes, got {}",
                b.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for StakingTag {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StakingTag {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        StakingTag::from_str(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_hex_roundtrip() {
        let tag = StakingTag::from_str("62626e31").unwrap();
        assert_eq!(tag.as_bytes(), b"bbn1");
        assert_eq!(tag.to_string(), "62626e31");
    }

    #[test]
    fn test_tag_rejects_wrong_length() {
        assert!(matches!(
            StakingTag::from_str("62626e"),
            Err(ParamsError::InvalidTag(_))
        ));
        assert!(matches!(
            StakingTag::from_str("62626e3131"),
            Err(ParamsError::InvalidTag(_))
        ));
        assert!(matches!(
            StakingTag::from_str("zzzzzzzz"),
            Err(ParamsError::InvalidTag(_))
        ));
    }
}

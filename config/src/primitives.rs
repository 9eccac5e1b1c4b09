use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{de::Error as DeserializeError, Deserialize, Deserializer, Serialize};

use crate::Error;

/// A finite 64-bit floating point type.
#[derive(Copy, Clone, Serialize, Default, PartialEq, PartialOrd)]
pub struct FiniteFloat(f64);

impl Eq for FiniteFloat {}

impl Hash for FiniteFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Debug for FiniteFloat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<FiniteFloat> for f64 {
    fn from(float: FiniteFloat) -> Self {
        float.0
    }
}

impl TryFrom<f64> for FiniteFloat {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() {
            Ok(Self(value))
        } else {
            Err(Error::NonFiniteFloat)
        }
    }
}

impl<'de> Deserialize<'de> for FiniteFloat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = f64::deserialize(deserializer)?;

        if inner.is_finite() {
            Ok(Self(inner))
        } else {
            Err(D::Error::custom(format!(
                "invalid value: `{inner}` is not finite"
            )))
        }
    }
}

/// A strictly positive finite 64-bit floating point type.
#[derive(Copy, Clone, Serialize, Default, PartialEq, PartialOrd, Eq, Hash)]
pub struct PositiveFloat(FiniteFloat);

impl fmt::Debug for PositiveFloat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

impl From<PositiveFloat> for f64 {
    fn from(float: PositiveFloat) -> Self {
        float.0.into()
    }
}

impl TryFrom<f64> for PositiveFloat {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let inner = FiniteFloat::try_from(value)?;

        if inner.0 > 0.0 {
            Ok(Self(inner))
        } else {
            Err(Error::NonPositiveFloat)
        }
    }
}

impl<'de> Deserialize<'de> for PositiveFloat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = FiniteFloat::deserialize(deserializer)?;

        if inner.0 > 0.0 {
            Ok(Self(inner))
        } else {
            Err(D::Error::custom(format!(
                "invalid value: `{}` is not greater than 0.0",
                inner.0
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_float_rejects_nan_and_infinity() {
        assert!(FiniteFloat::try_from(f64::NAN).is_err());
        assert!(FiniteFloat::try_from(f64::INFINITY).is_err());
        assert_eq!(f64::from(FiniteFloat::try_from(-2.5).unwrap()), -2.5);
    }

    #[test]
    fn positive_float_rejects_zero() {
        assert!(matches!(
            PositiveFloat::try_from(0.0),
            Err(Error::NonPositiveFloat)
        ));
        assert_eq!(f64::from(PositiveFloat::try_from(0.5).unwrap()), 0.5);
    }

    #[test]
    fn positive_float_deserialization_checks_sign() {
        #[derive(Deserialize)]
        struct Wrapper {
            value: PositiveFloat,
        }

        assert!(toml::from_str::<Wrapper>("value = -1.0").is_err());
        let wrapper: Wrapper = toml::from_str("value = 2.0").unwrap();
        assert_eq!(f64::from(wrapper.value), 2.0);
    }
}

//! JSON encoding of floating point data.
//!
//! JSON numbers cannot be NaN or infinite, so those values are written as the strings
//! `"NaN"`, `"Inf"` and `"-Inf"` and read back as the corresponding value.
use ndarray::{ArrayD, IxDyn};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq)]
struct JsonFloat(f64);

impl Serialize for JsonFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v == f64::INFINITY {
            serializer.serialize_str("Inf")
        } else if v == f64::NEG_INFINITY {
            serializer.serialize_str("-Inf")
        } else {
            serializer.serialize_f64(v)
        }
    }
}

impl<'de> Deserialize<'de> for JsonFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(JsonFloat(v)),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(JsonFloat(f64::NAN)),
                "Inf" => Ok(JsonFloat(f64::INFINITY)),
                "-Inf" => Ok(JsonFloat(f64::NEG_INFINITY)),
                other => Err(de::Error::invalid_value(
                    Unexpected::Str(other),
                    &"a number, NaN, Inf or -Inf",
                )),
            },
        }
    }
}

pub(crate) mod scalar {
    use super::*;

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsonFloat(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonFloat::deserialize(deserializer).map(|v| v.0)
    }
}

pub(crate) mod vec {
    use super::*;

    pub fn serialize<S: Serializer>(v: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(v.iter().map(|x| JsonFloat(*x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let v: Vec<JsonFloat> = Vec::deserialize(deserializer)?;
        Ok(v.into_iter().map(|x| x.0).collect())
    }
}

#[derive(Serialize, Deserialize)]
struct FloatArray {
    dim: Vec<usize>,
    data: Vec<JsonFloat>,
}

macro_rules! float_array {
    ($module:ident, $t:ty) => {
        pub(crate) mod $module {
            use super::*;

            pub fn serialize<S: Serializer>(
                arr: &ArrayD<$t>,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                FloatArray {
                    dim: arr.shape().to_vec(),
                    data: arr.iter().map(|x| JsonFloat(f64::from(*x))).collect(),
                }
                .serialize(serializer)
            }

            pub fn deserialize<'de, D: Deserializer<'de>>(
                deserializer: D,
            ) -> Result<ArrayD<$t>, D::Error> {
                let FloatArray { dim, data } = FloatArray::deserialize(deserializer)?;
                #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
                let data = data.into_iter().map(|x| x.0 as $t).collect();
                ArrayD::from_shape_vec(IxDyn(&dim), data).map_err(de::Error::custom)
            }
        }
    };
}

float_array!(array_f32, f32);
float_array!(array_f64, f64);

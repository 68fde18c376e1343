use ndarray::{arr0, Array, ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Storage type of a product variable.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    U8,
    U16,
    U32,
    I32,
    F32,
    F64,
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dtype::U8 => "u8",
            Dtype::U16 => "u16",
            Dtype::U32 => "u32",
            Dtype::I32 => "i32",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// Homogeneous n-dimensional variable data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "dtype", content = "data", rename_all = "lowercase")]
pub enum Values {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    F32(#[serde(with = "super::float::array_f32")] ArrayD<f32>),
    F64(#[serde(with = "super::float::array_f64")] ArrayD<f64>),
}

macro_rules! each {
    ($v:expr, $a:ident => $body:expr) => {
        match $v {
            Values::U8($a) => $body,
            Values::U16($a) => $body,
            Values::U32($a) => $body,
            Values::I32($a) => $body,
            Values::F32($a) => $body,
            Values::F64($a) => $body,
        }
    };
}

macro_rules! map_same {
    ($v:expr, $a:ident => $body:expr) => {
        match $v {
            Values::U8($a) => Values::U8($body),
            Values::U16($a) => Values::U16($body),
            Values::U32($a) => Values::U32($body),
            Values::I32($a) => Values::I32($body),
            Values::F32($a) => Values::F32($body),
            Values::F64($a) => Values::F64($body),
        }
    };
}

macro_rules! impl_from {
    ($t:ty, $variant:ident, $accessor:ident) => {
        impl<D: Dimension> From<Array<$t, D>> for Values {
            fn from(arr: Array<$t, D>) -> Self {
                Values::$variant(arr.into_dyn())
            }
        }

        impl From<Vec<$t>> for Values {
            fn from(v: Vec<$t>) -> Self {
                Values::$variant(Array::from(v).into_dyn())
            }
        }

        impl From<$t> for Values {
            fn from(v: $t) -> Self {
                Values::$variant(arr0(v).into_dyn())
            }
        }

        impl Values {
            #[must_use]
            pub fn $accessor(&self) -> Option<&ArrayD<$t>> {
                match self {
                    Values::$variant(arr) => Some(arr),
                    _ => None,
                }
            }
        }
    };
}

impl_from!(u8, U8, as_u8);
impl_from!(u16, U16, as_u16);
impl_from!(u32, U32, as_u32);
impl_from!(i32, I32, as_i32);
impl_from!(f32, F32, as_f32);
impl_from!(f64, F64, as_f64);

impl Values {
    /// Default-filled values of `dtype` with the given shape.
    #[must_use]
    pub fn zeros(dtype: Dtype, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            Dtype::U8 => Values::U8(ArrayD::default(shape)),
            Dtype::U16 => Values::U16(ArrayD::default(shape)),
            Dtype::U32 => Values::U32(ArrayD::default(shape)),
            Dtype::I32 => Values::I32(ArrayD::default(shape)),
            Dtype::F32 => Values::F32(ArrayD::default(shape)),
            Dtype::F64 => Values::F64(ArrayD::default(shape)),
        }
    }

    #[must_use]
    pub fn dtype(&self) -> Dtype {
        match self {
            Values::U8(_) => Dtype::U8,
            Values::U16(_) => Dtype::U16,
            Values::U32(_) => Dtype::U32,
            Values::I32(_) => Dtype::I32,
            Values::F32(_) => Dtype::F32,
            Values::F64(_) => Dtype::F64,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        each!(self, a => a.shape())
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Length of the first axis, or 1 for a scalar.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    #[must_use]
    pub fn to_f64(&self) -> ArrayD<f64> {
        each!(self, a => a.mapv(|x| x as f64))
    }

    /// Convert to `dtype` using numeric `as` casts.
    #[must_use]
    pub fn cast(self, dtype: Dtype) -> Values {
        if self.dtype() == dtype {
            return self;
        }
        let f = self.to_f64();
        match dtype {
            Dtype::U8 => Values::U8(f.mapv(|x| x as u8)),
            Dtype::U16 => Values::U16(f.mapv(|x| x as u16)),
            Dtype::U32 => Values::U32(f.mapv(|x| x as u32)),
            Dtype::I32 => Values::I32(f.mapv(|x| x as i32)),
            Dtype::F32 => Values::F32(f.mapv(|x| x as f32)),
            Dtype::F64 => Values::F64(f),
        }
    }

    /// Add a leading axis of length 1, turning a single row into a one-row block.
    #[must_use]
    pub fn into_row_block(self) -> Values {
        map_same!(self, a => a.insert_axis(Axis(0)))
    }

    /// Write `src` rows at `start` along the first axis, growing with default values
    /// as needed. `src` is cast to the dtype of `self`.
    pub(crate) fn write_rows(&mut self, name: &str, start: usize, src: Values) -> Result<()> {
        let src = src.cast(self.dtype());
        let expected = self.shape().to_vec();
        let actual = src.shape().to_vec();
        let shape_err = || Error::Shape {
            name: name.to_string(),
            expected: expected.clone(),
            actual: actual.clone(),
        };
        let zult = match (self, src) {
            (Values::U8(dst), Values::U8(src)) => write_rows(dst, start, src.view()),
            (Values::U16(dst), Values::U16(src)) => write_rows(dst, start, src.view()),
            (Values::U32(dst), Values::U32(src)) => write_rows(dst, start, src.view()),
            (Values::I32(dst), Values::I32(src)) => write_rows(dst, start, src.view()),
            (Values::F32(dst), Values::F32(src)) => write_rows(dst, start, src.view()),
            (Values::F64(dst), Values::F64(src)) => write_rows(dst, start, src.view()),
            _ => return Err(shape_err()),
        };
        zult.map_err(|_| shape_err())
    }
}

fn write_rows<T>(
    dst: &mut ArrayD<T>,
    start: usize,
    src: ArrayViewD<T>,
) -> std::result::Result<(), ndarray::ShapeError>
where
    T: Clone + Default,
{
    if dst.ndim() == 0 || dst.ndim() != src.ndim() || dst.shape()[1..] != src.shape()[1..] {
        return Err(ndarray::ShapeError::from_kind(
            ndarray::ErrorKind::IncompatibleShape,
        ));
    }
    let len = dst.len_of(Axis(0));
    let end = start + src.len_of(Axis(0));

    if start == len {
        return dst.append(Axis(0), src);
    }
    if end > len {
        let mut fill = dst.shape().to_vec();
        fill[0] = end - len;
        dst.append(Axis(0), ArrayD::<T>::default(IxDyn(&fill)).view())?;
    }
    dst.slice_axis_mut(Axis(0), Slice::from(start..end))
        .assign(&src);
    Ok(())
}

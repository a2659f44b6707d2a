//! Cell types a raster can hold

use num_traits::{NumCast, Zero};
use std::fmt::{Debug, Display};

/// Cell value of a [`Raster`](crate::Raster).
///
/// Covariance bands and p-values are `f64`, change maps `u16` and direction
/// codes `u8`.
pub trait RasterElement:
    Copy + Debug + Display + PartialOrd + NumCast + Zero + Send + Sync + 'static
{
    /// Value substituted for samples that do not fit the type on read
    fn default_nodata() -> Self;

    /// Whether `self` is NaN or equals `nodata`
    fn is_nodata(&self, nodata: Option<Self>) -> bool;

    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_integer_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                0
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                nodata == Some(*self)
            }
        }
    )*};
}

macro_rules! impl_float_element {
    ($($t:ty),*) => {$(
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nodata(&self, nodata: Option<Self>) -> bool {
                self.is_nan() || nodata.is_some_and(|nd| *self == nd)
            }
        }
    )*};
}

impl_integer_element!(u8, u16, u32, i32);
impl_float_element!(f32, f64);

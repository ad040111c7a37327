pub use num::{One, Zero};
use num::{FromPrimitive, ToPrimitive};
use std::cmp::PartialEq;
use std::fmt::{Debug, Display};
use std::iter::Sum;

pub use std::ops::{Add, AddAssign, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

pub trait Numeric:
    Add<Output = Self>
    + AddAssign
    + Copy
    + Clone
    + One
    + Mul<Output = Self>
    + Sub<Output = Self>
    + PartialEq
    + PartialOrd
    + Zero
    + Debug
{
}
// https://stackoverflow.com/questions/42381185/specifying-generic-parameter-to-belong-to-a-small-set-of-types
macro_rules! numeric_impl {
    ($($t: ty),+) => {
        $(
            impl Numeric for $t {}
        )+
    }
}

numeric_impl!(usize, u8, u32, u64, u128, i8, i32, i64, i128, f32, f64);

/// Element type for everything that does calculus: kernels, layers, optimizers and losses.
pub trait Float:
    Numeric
    + num::Float
    + FromPrimitive
    + ToPrimitive
    + SubAssign
    + MulAssign
    + DivAssign
    + Sum
    + Display
    + Send
    + Sync
    + 'static
{
    /// Converts an `f64` constant into the element type.
    fn lit(value: f64) -> Self {
        Self::from_f64(value).unwrap_or_else(Self::nan)
    }

    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

impl Float for f32 {}
impl Float for f64 {}

#[test]
fn test_lit_roundtrips_constants() {
    assert_eq!(<f32 as Float>::lit(0.5), 0.5f32);
    assert_eq!(<f64 as Float>::lit(1e-7), 1e-7);
    assert_eq!(Float::as_f64(0.25f32), 0.25);
}

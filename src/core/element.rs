//! Signal element types
//!
//! Tracks store one of a small set of numeric element types. All arithmetic
//! is carried out in `f64` and converted back on store, so every operation is
//! written once against [`Element`].

use ndarray_npy::{ReadableElement, ViewElement, WritableElement};
use std::fmt;

/// Runtime tag of an element type, spelled as in `.npy` headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    F32,
    F64,
    U32,
    U8,
    Bool,
}

impl Dtype {
    /// `.npy` descriptor string (little endian)
    pub fn descr(&self) -> &'static str {
        match self {
            Dtype::F32 => "<f4",
            Dtype::F64 => "<f8",
            Dtype::U32 => "<u4",
            Dtype::U8 => "|u1",
            Dtype::Bool => "|b1",
        }
    }

    /// Parse a `.npy` descriptor, accepting native and explicit byte orders
    ///
    /// # Examples
    /// ```
    /// use pileup_engine::core::Dtype;
    /// assert_eq!(Dtype::from_descr("<f4"), Some(Dtype::F32));
    /// assert_eq!(Dtype::from_descr("=f8"), Some(Dtype::F64));
    /// assert_eq!(Dtype::from_descr("?"), Some(Dtype::Bool));
    /// assert_eq!(Dtype::from_descr(">f2"), None);
    /// ```
    pub fn from_descr(descr: &str) -> Option<Self> {
        let body = descr.trim_start_matches(['<', '=', '|']);
        match body {
            "f4" => Some(Dtype::F32),
            "f8" => Some(Dtype::F64),
            "u4" => Some(Dtype::U32),
            "u1" => Some(Dtype::U8),
            "b1" | "?" => Some(Dtype::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descr())
    }
}

/// A value type a signal track can hold
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + Send
    + Sync
    + fmt::Debug
    + WritableElement
    + ReadableElement
    + ViewElement
    + 'static
{
    const DTYPE: Dtype;

    fn to_f64(self) -> f64;

    /// Convert back from `f64`; integer types round toward zero and saturate
    fn from_f64(value: f64) -> Self;

    fn zero() -> Self {
        Self::default()
    }
}

impl Element for f32 {
    const DTYPE: Dtype = Dtype::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    const DTYPE: Dtype = Dtype::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

impl Element for u32 {
    const DTYPE: Dtype = Dtype::U32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        // `as` saturates and maps NaN to 0
        value as u32
    }
}

impl Element for u8 {
    const DTYPE: Dtype = Dtype::U8;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as u8
    }
}

impl Element for bool {
    const DTYPE: Dtype = Dtype::Bool;

    #[inline]
    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value != 0.0 && !value.is_nan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descr_round_trip() {
        for dtype in [Dtype::F32, Dtype::F64, Dtype::U32, Dtype::U8, Dtype::Bool] {
            assert_eq!(Dtype::from_descr(dtype.descr()), Some(dtype));
        }
    }

    #[test]
    fn test_integer_conversion_saturates() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(u32::from_f64(f64::NAN), 0);
        assert_eq!(u32::from_f64(2.9), 2);
    }

    #[test]
    fn test_bool_conversion() {
        assert!(bool::from_f64(0.5));
        assert!(!bool::from_f64(0.0));
        assert!(!bool::from_f64(f64::NAN));
        assert_eq!(true.to_f64(), 1.0);
    }
}

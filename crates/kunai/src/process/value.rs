//! Primitive values that can be reinterpreted from remote bytes.
//!
//! Only fixed-width integers and IEEE-754 floats are supported. All of them
//! are decoded little-endian, which is the byte order of every x86/x64 target
//! this crate attaches to, independent of the host's own order.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

mod sealed {
    pub trait Sealed {}
}

/// A primitive numeric layout readable from another process.
pub trait RemoteValue: Copy + sealed::Sealed {
    /// Size of the value in bytes
    const SIZE: usize;

    /// Decode from exactly `SIZE` little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Option<Self>;

    /// Post-processing applied at the point of read
    fn normalize(self) -> Self {
        self
    }
}

macro_rules! impl_remote_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl RemoteValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Option<Self> {
                    let array: [u8; std::mem::size_of::<$ty>()] = bytes.try_into().ok()?;
                    Some(<$ty>::from_le_bytes(array))
                }
            }
        )*
    };
}

impl_remote_int!(u8, i8, u16, i16, u32, i32, u64, i64);

impl sealed::Sealed for f32 {}

impl RemoteValue for f32 {
    const SIZE: usize = 4;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 4] = bytes.try_into().ok()?;
        Some(f32::from_le_bytes(array))
    }

    fn normalize(self) -> Self {
        round_hundredths_f32(self)
    }
}

impl sealed::Sealed for f64 {}

impl RemoteValue for f64 {
    const SIZE: usize = 8;

    fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(f64::from_le_bytes(array))
    }

    fn normalize(self) -> Self {
        round_hundredths(self)
    }
}

/// Round to two decimal places, ties away from zero.
pub fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `f32` variant of [`round_hundredths`]; the arithmetic runs in `f64`.
pub fn round_hundredths_f32(value: f32) -> f32 {
    round_hundredths(f64::from(value)) as f32
}

/// Runtime name of a [`RemoteValue`] layout, for callers that pick the type
/// from user input.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    #[default]
    F32,
    F64,
}

impl ValueKind {
    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Decode and normalize `bytes` as this kind, formatted for display
    pub fn format_bytes(self, bytes: &[u8]) -> Option<String> {
        fn fmt<T: RemoteValue + ToString>(bytes: &[u8]) -> Option<String> {
            T::from_le_slice(bytes).map(|v| v.normalize().to_string())
        }

        match self {
            Self::U8 => fmt::<u8>(bytes),
            Self::I8 => fmt::<i8>(bytes),
            Self::U16 => fmt::<u16>(bytes),
            Self::I16 => fmt::<i16>(bytes),
            Self::U32 => fmt::<u32>(bytes),
            Self::I32 => fmt::<i32>(bytes),
            Self::U64 => fmt::<u64>(bytes),
            Self::I64 => fmt::<i64>(bytes),
            Self::F32 => fmt::<f32>(bytes),
            Self::F64 => fmt::<f64>(bytes),
        }
    }
}

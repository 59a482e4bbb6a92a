//! Target-side owned values

use super::{ObjectHandle, ValueTag};

/// Owned target-native form of a tagged value.
///
/// This is what `TargetRuntime` implementations and registered callbacks
/// consume and produce; strings are plain Rust strings here.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Object(ObjectHandle),
}

impl HostValue {
    /// Wire tag of this value.
    #[inline]
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Void => ValueTag::Void,
            Self::Bool(_) => ValueTag::Bool,
            Self::I8(_) => ValueTag::I8,
            Self::I16(_) => ValueTag::I16,
            Self::I32(_) => ValueTag::I32,
            Self::I64(_) => ValueTag::I64,
            Self::F32(_) => ValueTag::F32,
            Self::F64(_) => ValueTag::F64,
            Self::Str(_) => ValueTag::String,
            Self::Object(_) => ValueTag::Object,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::F64(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<ObjectHandle> for HostValue {
    fn from(handle: ObjectHandle) -> Self {
        Self::Object(handle)
    }
}

//! Script-side owned values and the UTF-16 wire string

use std::ffi::CString;

use super::{MarshalError, ObjectHandle, ValueTag};

/// Length-prefixed UTF-16 buffer in the script wire format.
///
/// Layout: two u16 words holding the unit count as a little-endian u32
/// (low word first), followed by that many UTF-16 code units. Buffers are
/// allocated by the bridge allocator; `into_raw` / `from_raw` transfer
/// ownership across the C boundary without copying.
pub struct ScriptString {
    // Invariant: buf.len() == 2 + unit count encoded in buf[0..2].
    buf: Box<[u16]>,
}

impl ScriptString {
    /// Encode a Rust string into a fresh prefixed UTF-16 buffer.
    pub fn encode(s: &str) -> Self {
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = units.len() as u32;
        let mut buf = Vec::with_capacity(2 + units.len());
        buf.push((len & 0xFFFF) as u16);
        buf.push((len >> 16) as u16);
        buf.extend_from_slice(&units);
        Self {
            buf: buf.into_boxed_slice(),
        }
    }

    /// Number of UTF-16 code units in the payload.
    #[inline]
    pub fn unit_count(&self) -> usize {
        self.buf.len() - 2
    }

    /// The UTF-16 payload, prefix excluded.
    #[inline]
    pub fn units(&self) -> &[u16] {
        &self.buf[2..]
    }

    /// Mutable payload access; the script side fills allocated buffers in
    /// place.
    #[inline]
    pub fn units_mut(&mut self) -> &mut [u16] {
        &mut self.buf[2..]
    }

    /// Decode the payload into a Rust string.
    pub fn decode(&self) -> Result<String, MarshalError> {
        String::from_utf16(self.units()).map_err(|_| MarshalError::BadUtf16)
    }

    /// Allocate a zeroed buffer with the prefix already written.
    ///
    /// The script side fills the code units in place before handing the
    /// buffer across as an argument.
    pub fn with_capacity(units: usize) -> Self {
        let len = units as u32;
        let mut buf = vec![0u16; 2 + units];
        buf[0] = (len & 0xFFFF) as u16;
        buf[1] = (len >> 16) as u16;
        Self {
            buf: buf.into_boxed_slice(),
        }
    }

    /// Release ownership of the buffer to a raw pointer at the prefix.
    pub fn into_raw(self) -> *mut u16 {
        Box::into_raw(self.buf) as *mut u16
    }

    /// Adopt a raw prefixed buffer previously produced by [`Self::into_raw`]
    /// or `objbridge_utf16_alloc`.
    ///
    /// # Safety
    /// `ptr` must point at the prefix of a live buffer from the bridge
    /// allocator, and ownership must not be held anywhere else.
    pub unsafe fn from_raw(ptr: *mut u16) -> Self {
        let lo = *ptr as u32;
        let hi = *ptr.add(1) as u32;
        let units = (hi << 16 | lo) as usize;
        let slice = core::ptr::slice_from_raw_parts_mut(ptr, 2 + units);
        Self {
            buf: Box::from_raw(slice),
        }
    }
}

impl core::fmt::Debug for ScriptString {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.decode() {
            Ok(s) => write!(f, "ScriptString({:?})", s),
            Err(_) => write!(f, "ScriptString(<{} units, invalid>)", self.unit_count()),
        }
    }
}

impl PartialEq for ScriptString {
    fn eq(&self, other: &Self) -> bool {
        self.units() == other.units()
    }
}

impl Eq for ScriptString {}

impl Clone for ScriptString {
    fn clone(&self) -> Self {
        Self {
            buf: self.buf.clone(),
        }
    }
}

/// Owned script-side form of a tagged value.
///
/// Strings keep their wire encoding here (UTF-16 buffer or UTF-8 C string);
/// transcoding to Rust strings happens in `to_target`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Void,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Utf16(ScriptString),
    Utf8(CString),
    Object(ObjectHandle),
}

impl ScriptValue {
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
            Self::Utf16(_) | Self::Utf8(_) => ValueTag::String,
            Self::Object(_) => ValueTag::Object,
        }
    }
}

//! Cross-boundary value model and marshalling
//!
//! Design: fixed tagged-value scheme shared by both runtimes:
//! - `ValueTag` + `RawSlot` + `TaggedSlot` - the (type-tag, pointer-sized
//!   value) wire pairs crossing the native boundary
//! - `ScriptValue` - owned script-side form (UTF-16 or UTF-8 C strings)
//! - `HostValue` - owned target-side form (Rust strings)
//! - `to_target` / `to_script` - the two conversion directions, each an
//!   allocation-owning transform; string buffers change owners on the way

mod host;
mod script;

pub use host::HostValue;
pub use script::{ScriptString, ScriptValue};

use core::ffi::c_void;
use smallvec::SmallVec;
use std::ffi::{CStr, CString};


/// Inline capacity for argument/signature vectors; calls rarely carry more.
pub const INLINE_ARGS: usize = 8;

/// Signature of a call: one tag per argument.
pub type TagList = SmallVec<[ValueTag; INLINE_ARGS]>;

/// Marshalled target-side argument list.
pub type HostArgs = SmallVec<[HostValue; INLINE_ARGS]>;

/// Opaque pointer-sized identifier for a target-runtime object.
///
/// Zero is the null handle. The bridge never dereferences a handle; it only
/// stores it, compares it, and passes it back to the target runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Type tag for a value crossing the runtime boundary.
///
/// The discriminants are the wire encoding and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueTag {
    Void = 0,
    Bool = 1,
    I8 = 2,
    I16 = 3,
    I32 = 4,
    I64 = 5,
    F32 = 6,
    F64 = 7,
    String = 8,
    Object = 9,
}

impl ValueTag {
    /// Decode a wire tag byte.
    #[inline]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Void),
            1 => Some(Self::Bool),
            2 => Some(Self::I8),
            3 => Some(Self::I16),
            4 => Some(Self::I32),
            5 => Some(Self::I64),
            6 => Some(Self::F32),
            7 => Some(Self::F64),
            8 => Some(Self::String),
            9 => Some(Self::Object),
            _ => None,
        }
    }

    /// Payload width in bytes (strings and handles are pointer-sized).
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Bool | Self::I8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 | Self::String | Self::Object => 8,
        }
    }

    /// Check if values of this tag carry no heap payload.
    #[inline]
    pub const fn is_scalar(self) -> bool {
        !matches!(self, Self::String | Self::Object)
    }

    /// Short name used in signature metadata and diagnostics.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Object => "object",
        }
    }
}

impl core::fmt::Display for ValueTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pointer-sized payload slot (untagged union).
#[repr(C)]
pub union RawSlot {
    pub boolean: bool,
    pub i8: i8,
    pub i16: i16,
    pub i32: i32,
    pub i64: i64,
    pub f32: f32,
    pub f64: f64,
    pub ptr: *mut c_void,
    pub bits: u64,
}

impl RawSlot {
    /// Zeroed slot (null pointer / zero scalar).
    #[inline]
    pub const fn zero() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }
}

impl Default for RawSlot {
    #[inline]
    fn default() -> Self {
        Self::zero()
    }
}

// Manual implementations since unions don't auto-derive.
impl Copy for RawSlot {}
impl Clone for RawSlot {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl core::fmt::Debug for RawSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RawSlot {{ ... }}")
    }
}

/// Tagged wire pair: one argument or result slot.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct TaggedSlot {
    pub tag: ValueTag,
    pub raw: RawSlot,
}

impl TaggedSlot {
    #[inline]
    pub const fn new(tag: ValueTag, raw: RawSlot) -> Self {
        Self { tag, raw }
    }

    /// Empty slot standing in for a missing/failed result.
    #[inline]
    pub const fn void() -> Self {
        Self {
            tag: ValueTag::Void,
            raw: RawSlot::zero(),
        }
    }
}

/// Bit marking the requested encoding of the call's string result.
pub const RETURN_UTF16_BIT: u32 = 1 << 31;

/// Check whether argument `index` is flagged as a UTF-16 buffer.
///
/// The mask covers the first 31 arguments; anything past that defaults to
/// UTF-8. Bit 31 is reserved for the return encoding.
#[inline]
pub const fn arg_is_utf16(mask: u32, index: usize) -> bool {
    index < 31 && mask & (1 << index) != 0
}

/// Check whether the caller asked for a UTF-16 string result.
#[inline]
pub const fn return_is_utf16(mask: u32) -> bool {
    mask & RETURN_UTF16_BIT != 0
}

/// Marshalling failures; any of these fails the whole call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// Wire tag byte outside the known set.
    UnknownTag(u8),
    /// String argument slot carried a null pointer.
    NullString,
    /// UTF-16 payload contained an unpaired surrogate.
    BadUtf16,
    /// UTF-8 payload was not valid UTF-8.
    BadUtf8,
    /// String result contained an interior NUL and cannot cross as UTF-8.
    InteriorNul,
    /// Reverse-call result tag did not match the declared return tag.
    ReturnTag { expected: ValueTag, got: ValueTag },
}

impl core::fmt::Display for MarshalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownTag(raw) => write!(f, "unknown type tag {:#04x}", raw),
            Self::NullString => write!(f, "string argument was a null pointer"),
            Self::BadUtf16 => write!(f, "invalid UTF-16 in string payload"),
            Self::BadUtf8 => write!(f, "invalid UTF-8 in string payload"),
            Self::InteriorNul => write!(f, "string contains an interior NUL byte"),
            Self::ReturnTag { expected, got } => {
                write!(f, "return tag mismatch: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for MarshalError {}

/// Marshal script-side arguments into target-native values.
///
/// Consumes the arguments: string buffers are transcoded and their script
/// copies released here. Scalars reinterpret by width and tag only; object
/// handles pass through untouched (no reference-table mutation).
pub fn to_target(args: Vec<ScriptValue>) -> Result<HostArgs, MarshalError> {
    let mut out = HostArgs::with_capacity(args.len());
    for arg in args {
        out.push(to_target_one(arg)?);
    }
    Ok(out)
}

/// Marshal one script value into its target-native form.
pub fn to_target_one(value: ScriptValue) -> Result<HostValue, MarshalError> {
    Ok(match value {
        ScriptValue::Void => HostValue::Void,
        ScriptValue::Bool(v) => HostValue::Bool(v),
        ScriptValue::I8(v) => HostValue::I8(v),
        ScriptValue::I16(v) => HostValue::I16(v),
        ScriptValue::I32(v) => HostValue::I32(v),
        ScriptValue::I64(v) => HostValue::I64(v),
        ScriptValue::F32(v) => HostValue::F32(v),
        ScriptValue::F64(v) => HostValue::F64(v),
        ScriptValue::Utf16(s) => HostValue::Str(s.decode()?),
        ScriptValue::Utf8(s) => HostValue::Str(s.into_string().map_err(|_| MarshalError::BadUtf8)?),
        ScriptValue::Object(h) => HostValue::Object(h),
    })
}

/// Marshal one target-native value into script-side form.
///
/// `utf16` selects the string result encoding (bit 31 of the call's string
/// mask). The produced buffer is owned by the returned value until it is
/// leaked to the script side.
pub fn to_script(value: HostValue, utf16: bool) -> Result<ScriptValue, MarshalError> {
    Ok(match value {
        HostValue::Void => ScriptValue::Void,
        HostValue::Bool(v) => ScriptValue::Bool(v),
        HostValue::I8(v) => ScriptValue::I8(v),
        HostValue::I16(v) => ScriptValue::I16(v),
        HostValue::I32(v) => ScriptValue::I32(v),
        HostValue::I64(v) => ScriptValue::I64(v),
        HostValue::F32(v) => ScriptValue::F32(v),
        HostValue::F64(v) => ScriptValue::F64(v),
        HostValue::Str(s) => {
            if utf16 {
                ScriptValue::Utf16(ScriptString::encode(&s))
            } else {
                ScriptValue::Utf8(CString::new(s).map_err(|_| MarshalError::InteriorNul)?)
            }
        }
        HostValue::Object(h) => ScriptValue::Object(h),
    })
}

/// Build the reverse-call tag list: one entry per argument plus the trailing
/// synthetic entry carrying the return tag.
pub fn reverse_tag_list(args: &[HostValue], ret: ValueTag) -> TagList {
    let mut tags = TagList::with_capacity(args.len() + 1);
    for arg in args {
        tags.push(arg.tag());
    }
    tags.push(ret);
    tags
}

/// Adopt a raw wire argument array into owned script values plus the decoded
/// call signature. Each tag byte is decoded exactly once.
///
/// Ownership rules at this boundary: UTF-16 buffers transfer to the bridge
/// (freed after transcoding), UTF-8 C strings are copied and stay owned by
/// the caller. An unknown tag or null string pointer fails the whole call.
///
/// # Safety
/// `args` and `tags` must point to `argc` valid entries; flagged string
/// slots must hold pointers matching the mask's encoding.
pub unsafe fn adopt_args(
    args: *const RawSlot,
    tags: *const u8,
    argc: usize,
    mask: u32,
) -> Result<(Vec<ScriptValue>, TagList), MarshalError> {
    let mut sig = TagList::with_capacity(argc);
    let mut out = Vec::with_capacity(argc);
    for i in 0..argc {
        let raw_tag = *tags.add(i);
        let tag = ValueTag::from_raw(raw_tag).ok_or(MarshalError::UnknownTag(raw_tag))?;
        sig.push(tag);
        out.push(adopt_value(*args.add(i), tag, arg_is_utf16(mask, i))?);
    }
    Ok((out, sig))
}

/// Adopt a single wire slot with a known tag.
///
/// # Safety
/// String slots must hold a pointer valid for the selected encoding.
pub unsafe fn adopt_value(
    slot: RawSlot,
    tag: ValueTag,
    utf16: bool,
) -> Result<ScriptValue, MarshalError> {
    Ok(match tag {
        ValueTag::Void => ScriptValue::Void,
        ValueTag::Bool => ScriptValue::Bool(slot.boolean),
        ValueTag::I8 => ScriptValue::I8(slot.i8),
        ValueTag::I16 => ScriptValue::I16(slot.i16),
        ValueTag::I32 => ScriptValue::I32(slot.i32),
        ValueTag::I64 => ScriptValue::I64(slot.i64),
        ValueTag::F32 => ScriptValue::F32(slot.f32),
        ValueTag::F64 => ScriptValue::F64(slot.f64),
        ValueTag::String => {
            if slot.ptr.is_null() {
                return Err(MarshalError::NullString);
            }
            if utf16 {
                ScriptValue::Utf16(ScriptString::from_raw(slot.ptr as *mut u16))
            } else {
                ScriptValue::Utf8(CStr::from_ptr(slot.ptr as *const _).to_owned())
            }
        }
        ValueTag::Object => ScriptValue::Object(ObjectHandle::from_raw(slot.bits)),
    })
}

/// Adopt a self-describing wire slot (tag carried in the slot itself).
///
/// Used for reverse-call results; string payloads are UTF-16 per the
/// reverse-call contract.
///
/// # Safety
/// See [`adopt_value`].
pub unsafe fn adopt_slot(slot: TaggedSlot) -> Result<ScriptValue, MarshalError> {
    adopt_value(slot.raw, slot.tag, true)
}

/// Leak an owned script value into a wire slot.
///
/// String payload ownership transfers to the consumer of the slot, which
/// must hand it back through `objbridge_utf16_free` / `objbridge_string_free`
/// (or re-adopt it).
pub fn into_slot(value: ScriptValue) -> TaggedSlot {
    match value {
        ScriptValue::Void => TaggedSlot::void(),
        ScriptValue::Bool(v) => TaggedSlot::new(ValueTag::Bool, RawSlot { boolean: v }),
        ScriptValue::I8(v) => TaggedSlot::new(ValueTag::I8, RawSlot { i8: v }),
        ScriptValue::I16(v) => TaggedSlot::new(ValueTag::I16, RawSlot { i16: v }),
        ScriptValue::I32(v) => TaggedSlot::new(ValueTag::I32, RawSlot { i32: v }),
        ScriptValue::I64(v) => TaggedSlot::new(ValueTag::I64, RawSlot { i64: v }),
        ScriptValue::F32(v) => TaggedSlot::new(ValueTag::F32, RawSlot { f32: v }),
        ScriptValue::F64(v) => TaggedSlot::new(ValueTag::F64, RawSlot { f64: v }),
        ScriptValue::Utf16(s) => TaggedSlot::new(
            ValueTag::String,
            RawSlot {
                ptr: s.into_raw() as *mut c_void,
            },
        ),
        ScriptValue::Utf8(s) => TaggedSlot::new(
            ValueTag::String,
            RawSlot {
                ptr: s.into_raw() as *mut c_void,
            },
        ),
        ScriptValue::Object(h) => TaggedSlot::new(ValueTag::Object, RawSlot { bits: h.as_raw() }),
    }
}

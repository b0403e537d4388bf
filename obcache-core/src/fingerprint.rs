//! Structural fingerprinting of call arguments.
//!
//! Arguments are walked through [`serde`] and fed as a tagged token stream into
//! a streaming xxh3 hasher. Every kind of value writes its own tag, so `1`,
//! `"1"` and `[1]` never collide by construction. Nesting is limited: a
//! container found at the maximum depth is hashed as an opaque marker instead
//! of being walked, which bounds the cost of deeply nested arguments.
//!
//! Map entries are hashed independently of iteration order, so two equal
//! `HashMap`s produce the same key. Sets serialize as plain sequences and keep
//! their iteration order; pass a `BTreeSet` rather than a `HashSet`.
//!
//! When the arguments are a tuple (or any sequence) at the top level, elements
//! whose index is listed in [`SkipPositions`] are left out of the stream. A
//! non-sequence argument is treated as a single argument at position `0`.
//!
//! ```
//! use obcache_core::{SkipPositions, derive_key};
//!
//! let skip = SkipPositions::new([1]);
//! let a = derive_key("load0", &(42, "trace-a"), &skip).unwrap();
//! let b = derive_key("load0", &(42, "trace-b"), &skip).unwrap();
//! assert_eq!(a, b);
//! ```
//!
//! This is a fast fingerprint, not a cryptographic hash.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use serde::ser;
use xxhash_rust::xxh3::Xxh3;

use crate::CacheKey;

/// Default recursion limit for argument fingerprinting.
pub const DEFAULT_MAX_DEPTH: usize = 8;

mod tag {
    pub const UNIT: u8 = 0x01;
    pub const BOOL: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const UINT: u8 = 0x04;
    pub const FLOAT: u8 = 0x05;
    pub const CHAR: u8 = 0x06;
    pub const STR: u8 = 0x07;
    pub const BYTES: u8 = 0x08;
    pub const NONE: u8 = 0x09;
    pub const SOME: u8 = 0x0a;
    pub const SEQ: u8 = 0x0b;
    pub const MAP: u8 = 0x0c;
    pub const VARIANT: u8 = 0x0d;
    pub const UNIT_STRUCT: u8 = 0x0e;
    pub const END: u8 = 0x0f;
    pub const OPAQUE: u8 = 0x10;
    pub const OPERATION: u8 = 0x11;
}

/// Error raised when arguments cannot be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The argument's `Serialize` implementation reported an error.
    #[error("failed to fingerprint arguments: {0}")]
    Serialize(String),
}

impl ser::Error for KeyError {
    fn custom<T: Display>(msg: T) -> Self {
        KeyError::Serialize(msg.to_string())
    }
}

/// Argument indices excluded from key derivation.
///
/// Cloning is cheap: the positions are shared behind an [`Arc`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPositions(Arc<BTreeSet<usize>>);

impl SkipPositions {
    /// Creates a skip set from argument indices.
    pub fn new(positions: impl IntoIterator<Item = usize>) -> Self {
        Self(Arc::new(positions.into_iter().collect()))
    }

    /// An empty skip set, every argument participates in the key.
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if the argument at `index` is excluded.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(&index)
    }

    /// Returns `true` if no position is excluded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over excluded positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl<const N: usize> From<[usize; N]> for SkipPositions {
    fn from(positions: [usize; N]) -> Self {
        Self::new(positions)
    }
}

impl From<Vec<usize>> for SkipPositions {
    fn from(positions: Vec<usize>) -> Self {
        Self::new(positions)
    }
}

/// Derives cache keys with a configurable recursion limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGenerator {
    max_depth: usize,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl KeyGenerator {
    /// Creates a generator that walks arguments at most `max_depth` levels deep.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Returns the configured recursion limit.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Derives the key for `operation` called with `args`, ignoring skipped positions.
    pub fn derive<A>(
        &self,
        operation: &str,
        args: &A,
        skip: &SkipPositions,
    ) -> Result<CacheKey, KeyError>
    where
        A: Serialize + ?Sized,
    {
        let mut hasher = Xxh3::new();
        hasher.update(&[tag::OPERATION]);
        write_len_prefixed(&mut hasher, operation.as_bytes());
        args.serialize(Fingerprinter {
            hasher: &mut hasher,
            depth: 0,
            max_depth: self.max_depth,
            skip: Some(skip),
        })?;
        Ok(CacheKey::new(operation, hasher.digest()))
    }
}

/// Derives a key with the default recursion limit ([`DEFAULT_MAX_DEPTH`]).
pub fn derive_key<A>(operation: &str, args: &A, skip: &SkipPositions) -> Result<CacheKey, KeyError>
where
    A: Serialize + ?Sized,
{
    KeyGenerator::default().derive(operation, args, skip)
}

fn write_len_prefixed(hasher: &mut Xxh3, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Serializer writing the token stream of one value.
///
/// `skip` is only set for the top-level argument value.
struct Fingerprinter<'a> {
    hasher: &'a mut Xxh3,
    depth: usize,
    max_depth: usize,
    skip: Option<&'a SkipPositions>,
}

impl<'a> Fingerprinter<'a> {
    /// A top-level scalar is argument `0`; skipping it leaves an empty argument list.
    fn skipped(&self) -> bool {
        self.skip.is_some_and(|skip| skip.contains(0))
    }

    fn leaf(self, kind: u8, payload: &[u8]) -> Result<(), KeyError> {
        if self.skipped() {
            return self.empty_args();
        }
        self.hasher.update(&[kind]);
        self.hasher.update(payload);
        Ok(())
    }

    fn leaf_len_prefixed(self, kind: u8, payload: &[u8]) -> Result<(), KeyError> {
        if self.skipped() {
            return self.empty_args();
        }
        self.hasher.update(&[kind]);
        write_len_prefixed(self.hasher, payload);
        Ok(())
    }

    fn empty_args(self) -> Result<(), KeyError> {
        self.hasher.update(&[tag::SEQ, tag::END]);
        Ok(())
    }

    /// Opens a container; past the depth limit the container becomes opaque.
    fn open(self, kind: u8, name: Option<&str>, filter: bool) -> Compound<'a> {
        let top_level_skipped = !filter && self.skipped();
        let muted = top_level_skipped || self.depth >= self.max_depth;
        if top_level_skipped {
            self.hasher.update(&[tag::SEQ, tag::END]);
        } else if self.depth >= self.max_depth {
            self.hasher.update(&[tag::OPAQUE]);
        } else {
            self.hasher.update(&[kind]);
            if let Some(name) = name {
                write_len_prefixed(self.hasher, name.as_bytes());
            }
        }
        Compound {
            hasher: self.hasher,
            depth: self.depth,
            max_depth: self.max_depth,
            muted,
            skip: if filter { self.skip } else { None },
            index: 0,
            entry: None,
            entries: Vec::new(),
        }
    }

    fn nested(&mut self) -> Fingerprinter<'_> {
        Fingerprinter {
            hasher: &mut *self.hasher,
            depth: self.depth,
            max_depth: self.max_depth,
            skip: None,
        }
    }
}

impl<'a> ser::Serializer for Fingerprinter<'a> {
    type Ok = ();
    type Error = KeyError;
    type SerializeSeq = Compound<'a>;
    type SerializeTuple = Compound<'a>;
    type SerializeTupleStruct = Compound<'a>;
    type SerializeTupleVariant = Compound<'a>;
    type SerializeMap = Compound<'a>;
    type SerializeStruct = Compound<'a>;
    type SerializeStructVariant = Compound<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), KeyError> {
        self.leaf(tag::BOOL, &[v as u8])
    }

    fn serialize_i8(self, v: i8) -> Result<(), KeyError> {
        self.serialize_i128(v.into())
    }

    fn serialize_i16(self, v: i16) -> Result<(), KeyError> {
        self.serialize_i128(v.into())
    }

    fn serialize_i32(self, v: i32) -> Result<(), KeyError> {
        self.serialize_i128(v.into())
    }

    fn serialize_i64(self, v: i64) -> Result<(), KeyError> {
        self.serialize_i128(v.into())
    }

    // Integers of every width share one encoding, `1u8` and `1i64` are the same argument.
    fn serialize_i128(self, v: i128) -> Result<(), KeyError> {
        if v >= 0 {
            return self.serialize_u128(v as u128);
        }
        self.leaf(tag::INT, &v.to_le_bytes())
    }

    fn serialize_u8(self, v: u8) -> Result<(), KeyError> {
        self.serialize_u128(v.into())
    }

    fn serialize_u16(self, v: u16) -> Result<(), KeyError> {
        self.serialize_u128(v.into())
    }

    fn serialize_u32(self, v: u32) -> Result<(), KeyError> {
        self.serialize_u128(v.into())
    }

    fn serialize_u64(self, v: u64) -> Result<(), KeyError> {
        self.serialize_u128(v.into())
    }

    fn serialize_u128(self, v: u128) -> Result<(), KeyError> {
        self.leaf(tag::UINT, &v.to_le_bytes())
    }

    fn serialize_f32(self, v: f32) -> Result<(), KeyError> {
        self.serialize_f64(v.into())
    }

    fn serialize_f64(self, v: f64) -> Result<(), KeyError> {
        self.leaf(tag::FLOAT, &v.to_bits().to_le_bytes())
    }

    fn serialize_char(self, v: char) -> Result<(), KeyError> {
        self.leaf(tag::CHAR, &u32::from(v).to_le_bytes())
    }

    fn serialize_str(self, v: &str) -> Result<(), KeyError> {
        self.leaf_len_prefixed(tag::STR, v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), KeyError> {
        self.leaf_len_prefixed(tag::BYTES, v)
    }

    fn serialize_none(self) -> Result<(), KeyError> {
        self.leaf(tag::NONE, &[])
    }

    fn serialize_some<T>(mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        if self.skipped() {
            return self.empty_args();
        }
        self.hasher.update(&[tag::SOME]);
        value.serialize(self.nested())
    }

    fn serialize_unit(self) -> Result<(), KeyError> {
        self.leaf(tag::UNIT, &[])
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<(), KeyError> {
        self.leaf_len_prefixed(tag::UNIT_STRUCT, name.as_bytes())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<(), KeyError> {
        self.leaf_len_prefixed(tag::VARIANT, variant.as_bytes())
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        // Newtypes are transparent: the skip set still applies to the wrapped value.
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        let mut compound = self.open(tag::VARIANT, Some(variant), false);
        ser::SerializeTupleVariant::serialize_field(&mut compound, value)?;
        ser::SerializeTupleVariant::end(compound)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::SEQ, None, true))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::SEQ, None, true))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::SEQ, None, true))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::VARIANT, Some(variant), false))
    }

    fn serialize_map(self, len: Option<usize>) -> Result<Compound<'a>, KeyError> {
        let mut compound = self.open(tag::MAP, None, false);
        if !compound.muted {
            compound.entries.reserve(len.unwrap_or(0));
        }
        Ok(compound)
    }

    // Structs hash like maps keyed by field name; the type name is not part of the key.
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::MAP, None, false))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Compound<'a>, KeyError> {
        Ok(self.open(tag::VARIANT, Some(variant), false))
    }
}

/// State of one open container.
struct Compound<'a> {
    hasher: &'a mut Xxh3,
    depth: usize,
    max_depth: usize,
    muted: bool,
    skip: Option<&'a SkipPositions>,
    index: usize,
    /// Hasher of the map entry or struct field whose key was written but not its value yet.
    entry: Option<Xxh3>,
    /// Digests of completed map entries, written sorted on close.
    entries: Vec<u64>,
}

fn walk<T>(hasher: &mut Xxh3, depth: usize, max_depth: usize, value: &T) -> Result<(), KeyError>
where
    T: ?Sized + Serialize,
{
    value.serialize(Fingerprinter {
        hasher,
        depth,
        max_depth,
        skip: None,
    })
}

impl Compound<'_> {
    fn element<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        let index = self.index;
        self.index += 1;
        if self.muted || self.skip.is_some_and(|skip| skip.contains(index)) {
            return Ok(());
        }
        walk(self.hasher, self.depth + 1, self.max_depth, value)
    }

    fn map_key<T>(&mut self, key: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        if self.muted {
            return Ok(());
        }
        let mut entry = Xxh3::new();
        walk(&mut entry, self.depth + 1, self.max_depth, key)?;
        self.entry = Some(entry);
        Ok(())
    }

    fn map_value<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        if self.muted {
            return Ok(());
        }
        let mut entry = self.entry.take().unwrap_or_default();
        walk(&mut entry, self.depth + 1, self.max_depth, value)?;
        self.entries.push(entry.digest());
        Ok(())
    }

    fn close(mut self) -> Result<(), KeyError> {
        if self.muted {
            return Ok(());
        }
        self.entries.sort_unstable();
        for digest in &self.entries {
            self.hasher.update(&digest.to_le_bytes());
        }
        self.hasher.update(&[tag::END]);
        Ok(())
    }
}

impl ser::SerializeSeq for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeTuple for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeTupleStruct for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeTupleVariant for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.element(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeMap for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.map_key(key)
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.map_value(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeStruct for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.map_key(key)?;
        self.map_value(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

impl ser::SerializeStructVariant for Compound<'_> {
    type Ok = ();
    type Error = KeyError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), KeyError>
    where
        T: ?Sized + Serialize,
    {
        self.map_key(key)?;
        self.map_value(value)
    }

    fn end(self) -> Result<(), KeyError> {
        self.close()
    }
}

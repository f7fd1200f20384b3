//! Cache Key Module
//!
//! Maps an ordered parameter tuple to a canonical [`CacheKey`].
//!
//! Every parameter writes one type-tagged, length-prefixed segment, so two
//! distinct tuples never share an encoding (`("#", "")` and `("", "#")` stay
//! apart). Smart pointers and references are projected to the value they point
//! to: two `Arc`s holding equal values produce the same key.

use std::borrow::Borrow;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

// == Cache Key ==
/// Canonical identity of an entry inside one cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Returns the encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// == Key Encoder ==
/// Accumulates the segments of one key.
#[derive(Debug, Default)]
pub struct KeyEncoder {
    buf: String,
}

impl KeyEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `<tag><len>:<payload>` segment.
    pub fn write_segment(&mut self, tag: char, payload: &str) {
        self.write_len(tag, payload.len());
        self.buf.push_str(payload);
    }

    /// Appends a bare tag, used as a prefix for composite values.
    pub fn write_tag(&mut self, tag: char) {
        self.buf.push(tag);
    }

    /// Appends a composite header carrying an element count.
    pub fn write_len(&mut self, tag: char, len: usize) {
        self.buf.push(tag);
        self.buf.push_str(&len.to_string());
        self.buf.push(':');
    }

    pub fn finish(self) -> CacheKey {
        CacheKey::from(self.buf)
    }
}

// == Key Part ==
/// A single parameter that can contribute to a cache key.
///
/// Implementations must be deterministic and depend only on the value, never
/// on its address or on caller-local state.
pub trait KeyPart {
    fn encode_key(&self, enc: &mut KeyEncoder);
}

macro_rules! display_key_part {
    ($tag:literal => $($t:ty),+) => {
        $(
            impl KeyPart for $t {
                fn encode_key(&self, enc: &mut KeyEncoder) {
                    enc.write_segment($tag, &self.to_string());
                }
            }
        )+
    };
}

display_key_part!('i' => i8, i16, i32, i64, i128, isize);
display_key_part!('u' => u8, u16, u32, u64, u128, usize);
display_key_part!('c' => char);

impl KeyPart for bool {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        enc.write_segment('b', if *self { "1" } else { "0" });
    }
}

impl KeyPart for str {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        enc.write_segment('s', self);
    }
}

impl KeyPart for String {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        self.as_str().encode_key(enc);
    }
}

impl KeyPart for Duration {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        enc.write_segment('d', &self.as_nanos().to_string());
    }
}

impl<T: KeyPart> KeyPart for Option<T> {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        match self {
            Some(v) => {
                enc.write_tag('o');
                v.encode_key(enc);
            }
            None => enc.write_segment('n', ""),
        }
    }
}

impl<T: KeyPart> KeyPart for [T] {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        enc.write_len('l', self.len());
        for item in self {
            item.encode_key(enc);
        }
    }
}

impl<T: KeyPart> KeyPart for Vec<T> {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        self.as_slice().encode_key(enc);
    }
}

macro_rules! pointer_key_part {
    ($($ptr:ident),+) => {
        $(
            impl<T: KeyPart + ?Sized> KeyPart for $ptr<T> {
                fn encode_key(&self, enc: &mut KeyEncoder) {
                    (**self).encode_key(enc);
                }
            }
        )+
    };
}

pointer_key_part!(Box, Arc, Rc);

impl<T: KeyPart + ?Sized> KeyPart for &T {
    fn encode_key(&self, enc: &mut KeyEncoder) {
        (**self).encode_key(enc);
    }
}

// == Params ==
/// An ordered parameter tuple accepted by a [`Loader`](crate::Loader).
///
/// Tuples have a fixed arity known at compile time. `Vec<T>` is variadic:
/// its arity is checked against the loader's declared arity on every call.
pub trait Params: Send + Sync + 'static {
    /// Arity fixed by the type, None for variadic lists
    const ARITY: Option<usize>;

    /// Number of parameters in this value.
    fn arity(&self) -> usize;

    /// Writes every parameter, in order.
    fn encode(&self, enc: &mut KeyEncoder);
}

impl Params for () {
    const ARITY: Option<usize> = Some(0);

    fn arity(&self) -> usize {
        0
    }

    fn encode(&self, _enc: &mut KeyEncoder) {}
}

macro_rules! tuple_params {
    ($n:expr; $($name:ident $idx:tt),+) => {
        impl<$($name),+> Params for ($($name,)+)
        where
            $($name: KeyPart + Send + Sync + 'static),+
        {
            const ARITY: Option<usize> = Some($n);

            fn arity(&self) -> usize {
                $n
            }

            fn encode(&self, enc: &mut KeyEncoder) {
                $(self.$idx.encode_key(enc);)+
            }
        }
    };
}

tuple_params!(1; A 0);
tuple_params!(2; A 0, B 1);
tuple_params!(3; A 0, B 1, C 2);
tuple_params!(4; A 0, B 1, C 2, D 3);
tuple_params!(5; A 0, B 1, C 2, D 3, E 4);
tuple_params!(6; A 0, B 1, C 2, D 3, E 4, F 5);
tuple_params!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
tuple_params!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

impl<T> Params for Vec<T>
where
    T: KeyPart + Send + Sync + 'static,
{
    const ARITY: Option<usize> = None;

    fn arity(&self) -> usize {
        self.len()
    }

    fn encode(&self, enc: &mut KeyEncoder) {
        for item in self {
            item.encode_key(enc);
        }
    }
}

// == Key Codec ==
/// Maps parameters to a cache key.
///
/// Equal logical parameters must always produce the same key, and a codec
/// must not consult anything that is not part of the parameters.
pub trait KeyCodec<P>: Send + Sync {
    fn encode(&self, params: &P) -> CacheKey;
}

/// Length-prefixed encoding built from each parameter's [`KeyPart`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyCodec;

impl<P: Params> KeyCodec<P> for DefaultKeyCodec {
    fn encode(&self, params: &P) -> CacheKey {
        let mut enc = KeyEncoder::new();
        params.encode(&mut enc);
        enc.finish()
    }
}

/// Codec backed by a closure, see [`codec_fn`].
#[derive(Clone)]
pub struct FnKeyCodec<F>(F);

impl<P, F> KeyCodec<P> for FnKeyCodec<F>
where
    F: Fn(&P) -> String + Send + Sync,
{
    fn encode(&self, params: &P) -> CacheKey {
        CacheKey::from((self.0)(params))
    }
}

impl<F> fmt::Debug for FnKeyCodec<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnKeyCodec")
    }
}

/// Wraps a closure as a custom [`KeyCodec`].
pub fn codec_fn<P, F>(f: F) -> FnKeyCodec<F>
where
    F: Fn(&P) -> String + Send + Sync,
{
    FnKeyCodec(f)
}

use std::cmp::Ordering;
use std::fmt;

/// A fixed-width index key that can be copied in and out of page bytes.
///
/// Widths follow the supported instantiations: 4, 8, 16, 32 or 64 bytes.
pub trait IndexKey: Copy + Default + Send + Sync + fmt::Debug + 'static {
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;

    /// Initializes the key from a 64-bit integer (bulk-load format).
    fn set_from_integer(&mut self, value: i64);

    /// The embedded integer, for diagnostics and integer comparators.
    fn as_integer(&self) -> i64;
}

/// An opaque fixed-width key of N bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn from_integer(value: i64) -> Self {
        let mut key = Self::default();
        key.set_from_integer(value);
        key
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0u8; N] }
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>({})", N, self.as_integer())
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }

    fn set_from_integer(&mut self, value: i64) {
        self.data = [0u8; N];
        if N >= 8 {
            self.data[..8].copy_from_slice(&value.to_le_bytes());
        } else {
            self.data[..4].copy_from_slice(&(value as i32).to_le_bytes());
        }
    }

    fn as_integer(&self) -> i64 {
        if N >= 8 {
            i64::from_le_bytes(self.data[..8].try_into().unwrap())
        } else {
            i32::from_le_bytes(self.data[..4].try_into().unwrap()) as i64
        }
    }
}

/// Totally ordered key comparison, returning `<0 / 0 / >0` semantics via
/// `Ordering`.
pub trait KeyComparator<K>: Send + Sync {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Compares keys by their embedded integer value.
#[derive(Clone, Copy, Default)]
pub struct IntegerComparator;

impl<K: IndexKey> KeyComparator<K> for IntegerComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.as_integer().cmp(&b.as_integer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_key_roundtrip() {
        let key = GenericKey::<8>::from_integer(123_456_789);
        let mut buf = [0u8; 8];
        key.write_to(&mut buf);
        let back = GenericKey::<8>::read_from(&buf);
        assert_eq!(back.as_integer(), 123_456_789);
    }

    #[test]
    fn test_narrow_key_truncates_to_i32() {
        let key = GenericKey::<4>::from_integer(7);
        assert_eq!(key.as_integer(), 7);
        assert_eq!(GenericKey::<4>::SIZE, 4);
    }

    #[test]
    fn test_integer_comparator_orders_negatives() {
        let cmp = IntegerComparator;
        let a = GenericKey::<8>::from_integer(-5);
        let b = GenericKey::<8>::from_integer(3);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&b, &a), Ordering::Greater);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_wide_key_roundtrip() {
        let key = GenericKey::<32>::from_integer(i64::MAX);
        let mut buf = [0u8; 32];
        key.write_to(&mut buf);
        assert_eq!(GenericKey::<32>::read_from(&buf).as_integer(), i64::MAX);
    }
}

/// Strict weak ordering used by [`RbMap`](super::RbMap) to sort its keys.
///
/// Two keys are considered equal when neither is less than the other. The map never
/// holds two equal keys.
///
/// Any `Fn(&K, &K) -> bool` closure is a `Compare<K>`:
///
/// ```
/// use rbmap::collections::RbMap;
/// let mut map = RbMap::with_compare(|a: &i32, b: &i32| a.abs() < b.abs());
/// map.insert(-3, "a");
/// map.insert(2, "b");
/// assert!(!map.insert(3, "c").1);
/// assert_eq!(map.keys().copied().collect::<Vec<_>>(), [2, -3]);
/// ```
pub trait Compare<K: ?Sized> {
    /// Returns true if `a` is ordered before `b`.
    fn less(&self, a: &K, b: &K) -> bool;
}

/// Orders keys by their [`Ord`] implementation. This is the default ordering.
#[derive(Clone, Copy, Default, Debug)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Compare<K> for NaturalOrder {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        a < b
    }
}

/// Orders keys by the reverse of their [`Ord`] implementation.
#[derive(Clone, Copy, Default, Debug)]
pub struct ReverseOrder;

impl<K: Ord + ?Sized> Compare<K> for ReverseOrder {
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        b < a
    }
}

impl<K: ?Sized, F> Compare<K> for F
where
    F: Fn(&K, &K) -> bool,
{
    #[inline]
    fn less(&self, a: &K, b: &K) -> bool {
        self(a, b)
    }
}

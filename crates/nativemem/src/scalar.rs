// RebelDB™ © 2025 Huly Labs • https://hulylabs.com • SPDX-License-Identifier: MIT
//
// scalar.rs:

use std::sync::atomic::{AtomicI16, AtomicI32, AtomicI64, AtomicI8, Ordering};

/// A fixed-width integer that chunk storage can load and store, either as a
/// single atomic or as individual bytes.
///
/// `Atomic` must have the size of `Self` and an alignment equal to `WIDTH`,
/// which holds for every std atomic integer implemented below.
pub trait Scalar: Copy + PartialEq + Send + 'static {
    const WIDTH: usize;

    type Atomic;

    fn load(atomic: &Self::Atomic, order: Ordering) -> Self;
    fn store(atomic: &Self::Atomic, value: Self, order: Ordering);
    fn compare_exchange(atomic: &Self::Atomic, current: Self, new: Self) -> Result<Self, Self>;

    /// `bytes.len()` must equal `WIDTH`.
    fn from_ne_slice(bytes: &[u8]) -> Self;
    /// `out.len()` must equal `WIDTH`.
    fn write_ne_slice(self, out: &mut [u8]);
}

macro_rules! scalar {
    ($ty:ty, $atomic:ty) => {
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();

            type Atomic = $atomic;

            #[inline]
            fn load(atomic: &$atomic, order: Ordering) -> Self {
                atomic.load(order)
            }

            #[inline]
            fn store(atomic: &$atomic, value: Self, order: Ordering) {
                atomic.store(value, order)
            }

            #[inline]
            fn compare_exchange(atomic: &$atomic, current: Self, new: Self) -> Result<Self, Self> {
                atomic.compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
            }

            #[inline]
            fn from_ne_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_ne_bytes(raw)
            }

            #[inline]
            fn write_ne_slice(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_ne_bytes())
            }
        }
    };
}

scalar!(i8, AtomicI8);
scalar!(i16, AtomicI16);
scalar!(i32, AtomicI32);
scalar!(i64, AtomicI64);

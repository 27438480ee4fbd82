//! Feature-gated wrapper around `rayon`. With the `parallel` feature
//! disabled every trait in this module degrades to a plain sequential
//! `Iterator`, so the orchestrator in `gmls` is written once against
//! `MaybeParIter`/`MaybeParIterMut` and gets both a single-threaded and a
//! work-stealing implementation for free.

#[cfg(not(feature = "parallel"))]
use std::iter::{IntoIterator, Iterator};

#[cfg(feature = "parallel")]
pub use rayon::prelude::{
    IndexedParallelIterator, ParallelDrainFull, ParallelDrainRange, ParallelExtend,
    ParallelIterator,
};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub trait MaybeParIter<'data> {
    #[cfg(feature = "parallel")]
    type Item: Send + 'data;

    #[cfg(feature = "parallel")]
    type Iter: ParallelIterator<Item = Self::Item>;

    #[cfg(not(feature = "parallel"))]
    type Item;

    #[cfg(not(feature = "parallel"))]
    type Iter: Iterator<Item = Self::Item>;

    fn par_iter(&'data self) -> Self::Iter;
}

#[cfg(feature = "parallel")]
impl<'data, T> MaybeParIter<'data> for T
where
    T: ?Sized + IntoParallelRefIterator<'data>,
{
    type Item = T::Item;
    type Iter = T::Iter;

    fn par_iter(&'data self) -> Self::Iter {
        self.par_iter()
    }
}

#[cfg(not(feature = "parallel"))]
impl<'data, T: 'data> MaybeParIter<'data> for Vec<T> {
    type Item = &'data T;
    type Iter = std::slice::Iter<'data, T>;

    fn par_iter(&'data self) -> Self::Iter {
        self.iter()
    }
}

#[cfg(not(feature = "parallel"))]
impl<'data, T: 'data> MaybeParIter<'data> for [T] {
    type Item = &'data T;
    type Iter = std::slice::Iter<'data, T>;

    fn par_iter(&'data self) -> Self::Iter {
        self.iter()
    }
}

pub trait MaybeParIterMut<'data> {
    #[cfg(feature = "parallel")]
    type Item: Send + 'data;

    #[cfg(feature = "parallel")]
    type Iter: ParallelIterator<Item = Self::Item>;

    #[cfg(not(feature = "parallel"))]
    type Item;

    #[cfg(not(feature = "parallel"))]
    type Iter: Iterator<Item = Self::Item>;

    fn par_iter_mut(&'data mut self) -> Self::Iter;
}

#[cfg(feature = "parallel")]
impl<'data, T> MaybeParIterMut<'data> for T
where
    T: ?Sized + IntoParallelRefMutIterator<'data>,
{
    type Item = T::Item;
    type Iter = T::Iter;

    fn par_iter_mut(&'data mut self) -> Self::Iter {
        self.par_iter_mut()
    }
}

#[cfg(not(feature = "parallel"))]
impl<'data, T: 'data> MaybeParIterMut<'data> for Vec<T> {
    type Item = &'data mut T;
    type Iter = std::slice::IterMut<'data, T>;

    fn par_iter_mut(&'data mut self) -> Self::Iter {
        self.iter_mut()
    }
}

#[cfg(not(feature = "parallel"))]
impl<'data, T: 'data> MaybeParIterMut<'data> for [T] {
    type Item = &'data mut T;
    type Iter = std::slice::IterMut<'data, T>;

    fn par_iter_mut(&'data mut self) -> Self::Iter {
        self.iter_mut()
    }
}

pub trait MaybeIntoParIter {
    #[cfg(feature = "parallel")]
    type Item: Send;

    #[cfg(feature = "parallel")]
    type Iter: ParallelIterator<Item = Self::Item>;

    #[cfg(not(feature = "parallel"))]
    type Item;

    #[cfg(not(feature = "parallel"))]
    type Iter: Iterator<Item = Self::Item>;

    fn into_par_iter(self) -> Self::Iter;
}

#[cfg(feature = "parallel")]
impl<T> MaybeIntoParIter for T
where
    T: IntoParallelIterator,
{
    type Item = T::Item;
    type Iter = T::Iter;

    fn into_par_iter(self) -> Self::Iter {
        self.into_par_iter()
    }
}

#[cfg(not(feature = "parallel"))]
impl<T> MaybeIntoParIter for T
where
    T: IntoIterator,
{
    type Item = T::Item;
    type Iter = T::IntoIter;

    fn into_par_iter(self) -> Self::Iter {
        self.into_iter()
    }
}

/// Runs `f` over every item, short-circuiting as soon as any call
/// returns `Err`. Under `parallel` other in-flight tasks keep running
/// until rayon notices the failure and stops dispatching new ones; the
/// first error observed (not necessarily the first by index) is
/// returned, matching the "first team to observe a failure aborts the
/// batch" semantics of the orchestrator.
#[cfg(feature = "parallel")]
pub fn try_for_each_any<T, E, F>(iter: impl IntoParallelIterator<Item = T>, f: F) -> Result<(), E>
where
    T: Send,
    E: Send,
    F: Fn(T) -> Result<(), E> + Sync + Send,
{
    iter.into_par_iter().try_for_each(f)
}

#[cfg(not(feature = "parallel"))]
pub fn try_for_each_any<T, E, F>(iter: impl IntoIterator<Item = T>, f: F) -> Result<(), E>
where
    F: Fn(T) -> Result<(), E>,
{
    for item in iter {
        f(item)?;
    }
    Ok(())
}

#[cfg(feature = "parallel")]
pub fn join<A, B, RA, RB>(oper_a: A, oper_b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    rayon::join(oper_a, oper_b)
}

#[cfg(not(feature = "parallel"))]
pub fn join<A, B, RA, RB>(oper_a: A, oper_b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    (oper_a(), oper_b())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_for_each_any_propagates_first_error() {
        let items = vec![1, 2, 3, -1, 5];
        let result = try_for_each_any(items, |x| {
            if x < 0 {
                Err(format!("negative: {x}"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn try_for_each_any_succeeds_when_all_ok() {
        let items = vec![1, 2, 3];
        let result: Result<(), String> = try_for_each_any(items, |_| Ok(()));
        assert!(result.is_ok());
    }
}

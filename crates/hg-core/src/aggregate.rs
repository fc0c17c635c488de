//! Caller-supplied accumulation logic.
//!
//! A window operator is parametric over an [`AggregateFunction`]. `add` and
//! `merge` read the previous accumulator by reference and return a new one;
//! the store only swaps it in when the call succeeds, so a failing function
//! leaves the last good state in place.

use std::marker::PhantomData;
use std::sync::Arc;

/// Incremental aggregation over the records of one window.
pub trait AggregateFunction {
    type Input;
    type Acc;
    type Output;

    fn create_accumulator(&self) -> Self::Acc;

    fn add(&self, input: &Self::Input, acc: &Self::Acc) -> anyhow::Result<Self::Acc>;

    /// Combine two partial accumulators. Tumbling and sliding windows never
    /// call this; implementations should still be associative and commutative.
    fn merge(&self, a: &Self::Acc, b: &Self::Acc) -> anyhow::Result<Self::Acc>;

    fn extract(&self, acc: &Self::Acc) -> Self::Output;
}

// ---------------------------------------------------------------------------
// FnAggregate: four named functions passed as configuration
// ---------------------------------------------------------------------------

type CreateFn<A> = Arc<dyn Fn() -> A + Send + Sync>;
type AddFn<I, A> = Arc<dyn Fn(&I, &A) -> anyhow::Result<A> + Send + Sync>;
type MergeFn<A> = Arc<dyn Fn(&A, &A) -> anyhow::Result<A> + Send + Sync>;
type ExtractFn<A, O> = Arc<dyn Fn(&A) -> O + Send + Sync>;

/// An [`AggregateFunction`] assembled from plain functions or closures.
pub struct FnAggregate<I, A, O> {
    create: CreateFn<A>,
    add: AddFn<I, A>,
    merge: MergeFn<A>,
    extract: ExtractFn<A, O>,
}

impl<I, A, O> FnAggregate<I, A, O> {
    pub fn new(
        create: impl Fn() -> A + Send + Sync + 'static,
        add: impl Fn(&I, &A) -> anyhow::Result<A> + Send + Sync + 'static,
        merge: impl Fn(&A, &A) -> anyhow::Result<A> + Send + Sync + 'static,
        extract: impl Fn(&A) -> O + Send + Sync + 'static,
    ) -> Self {
        Self {
            create: Arc::new(create),
            add: Arc::new(add),
            merge: Arc::new(merge),
            extract: Arc::new(extract),
        }
    }
}

impl<I, A, O> Clone for FnAggregate<I, A, O> {
    fn clone(&self) -> Self {
        Self {
            create: Arc::clone(&self.create),
            add: Arc::clone(&self.add),
            merge: Arc::clone(&self.merge),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<I, A, O> AggregateFunction for FnAggregate<I, A, O> {
    type Input = I;
    type Acc = A;
    type Output = O;

    fn create_accumulator(&self) -> A {
        (self.create)()
    }

    fn add(&self, input: &I, acc: &A) -> anyhow::Result<A> {
        (self.add)(input, acc)
    }

    fn merge(&self, a: &A, b: &A) -> anyhow::Result<A> {
        (self.merge)(a, b)
    }

    fn extract(&self, acc: &A) -> O {
        (self.extract)(acc)
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Sum of a numeric field.
pub struct Sum<I, F> {
    field: F,
    _input: PhantomData<fn(&I)>,
}

impl<I, F: Fn(&I) -> f64> Sum<I, F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            _input: PhantomData,
        }
    }
}

impl<I, F: Clone> Clone for Sum<I, F> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            _input: PhantomData,
        }
    }
}

impl<I, F: Fn(&I) -> f64> AggregateFunction for Sum<I, F> {
    type Input = I;
    type Acc = f64;
    type Output = f64;

    fn create_accumulator(&self) -> f64 {
        0.0
    }

    fn add(&self, input: &I, acc: &f64) -> anyhow::Result<f64> {
        Ok(acc + (self.field)(input))
    }

    fn merge(&self, a: &f64, b: &f64) -> anyhow::Result<f64> {
        Ok(a + b)
    }

    fn extract(&self, acc: &f64) -> f64 {
        *acc
    }
}

/// Number of records in the window.
pub struct Count<I>(PhantomData<fn(&I)>);

impl<I> Count<I> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<I> Default for Count<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Clone for Count<I> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<I> AggregateFunction for Count<I> {
    type Input = I;
    type Acc = u64;
    type Output = u64;

    fn create_accumulator(&self) -> u64 {
        0
    }

    fn add(&self, _input: &I, acc: &u64) -> anyhow::Result<u64> {
        acc.checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("window record count overflow"))
    }

    fn merge(&self, a: &u64, b: &u64) -> anyhow::Result<u64> {
        a.checked_add(*b)
            .ok_or_else(|| anyhow::anyhow!("window record count overflow"))
    }

    fn extract(&self, acc: &u64) -> u64 {
        *acc
    }
}

/// Keeps the whole record with the largest value of `field`. On ties the
/// first record seen wins.
pub struct MaxBy<I, F> {
    field: F,
    _input: PhantomData<fn(&I)>,
}

impl<I, F: Fn(&I) -> f64> MaxBy<I, F> {
    pub fn new(field: F) -> Self {
        Self {
            field,
            _input: PhantomData,
        }
    }
}

impl<I, F: Clone> Clone for MaxBy<I, F> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            _input: PhantomData,
        }
    }
}

impl<I: Clone, F: Fn(&I) -> f64> AggregateFunction for MaxBy<I, F> {
    type Input = I;
    type Acc = Option<I>;
    type Output = Option<I>;

    fn create_accumulator(&self) -> Option<I> {
        None
    }

    fn add(&self, input: &I, acc: &Option<I>) -> anyhow::Result<Option<I>> {
        match acc {
            Some(best) if (self.field)(input) <= (self.field)(best) => Ok(Some(best.clone())),
            _ => Ok(Some(input.clone())),
        }
    }

    fn merge(&self, a: &Option<I>, b: &Option<I>) -> anyhow::Result<Option<I>> {
        match (a, b) {
            (Some(x), Some(y)) if (self.field)(y) > (self.field)(x) => Ok(Some(y.clone())),
            (Some(x), _) => Ok(Some(x.clone())),
            (None, other) => Ok(other.clone()),
        }
    }

    fn extract(&self, acc: &Option<I>) -> Option<I> {
        acc.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Typed step composition.
//!
//! A chain is an ordered list of step functions. Every non-terminal step
//! produces a value, and every later step receives the tuple of all values
//! produced before it:
//!
//! ```text
//! step 1: (cx, &())          -> Result<A>
//! step 2: (cx, &(A,))        -> Result<B>
//! step 3: (cx, &(A, B))      -> Result<C>
//! ...
//! step N: (cx, &(A, B, ..))  -> Result<()>
//! ```
//!
//! The chain is built with [`Chain::then`] for each non-terminal step and
//! [`Chain::handle`] for the terminal one. Each `then` wraps the previous
//! steps in a [`Then`] node, so the whole chain is a single nested type
//! whose accumulated output is checked by the compiler. There is no runtime
//! type inspection anywhere in the executor.
//!
//! # Example
//!
//! ```
//! use middle_core::chain::Chain;
//! use middle_core::exchange::Exchange;
//!
//! let pipeline = Chain::<Exchange>::new()
//!     .then(|_ex, ()| Ok("x".to_string()))
//!     .then(|_ex, (text,)| Ok(text.len() + 1))
//!     .handle(|ex, (text, count)| {
//!         ex.response_mut().write_str(&format!("{text}:{count}"));
//!         Ok(())
//!     });
//!
//! assert_eq!(pipeline.step_count(), 3);
//! ```

use crate::error::{Error, StepResult};
use crate::pipeline::Pipeline;
use std::fmt;
use std::marker::PhantomData;

/// Appends a value to the end of a tuple.
///
/// Implemented for tuples of up to 26 elements, which bounds a chain at 27
/// steps.
pub trait Append<T> {
    /// The tuple with `T` appended.
    type Output;

    /// Appends `value`.
    fn append(self, value: T) -> Self::Output;
}

macro_rules! impl_append {
    ($($ty:ident),*) => {
        #[allow(non_snake_case, clippy::unused_unit)]
        impl<$($ty,)* T> Append<T> for ($($ty,)*) {
            type Output = ($($ty,)* T,);

            fn append(self, value: T) -> Self::Output {
                let ($($ty,)*) = self;
                ($($ty,)* value,)
            }
        }
    };
}

impl_append!();
impl_append!(A);
impl_append!(A, B);
impl_append!(A, B, C);
impl_append!(A, B, C, D);
impl_append!(A, B, C, D, E);
impl_append!(A, B, C, D, E, F);
impl_append!(A, B, C, D, E, F, G);
impl_append!(A, B, C, D, E, F, G, H);
impl_append!(A, B, C, D, E, F, G, H, I);
impl_append!(A, B, C, D, E, F, G, H, I, J);
impl_append!(A, B, C, D, E, F, G, H, I, J, K);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U, V);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U, V, W);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U, V, W, X);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U, V, W, X, Y);
impl_append!(A, B, C, D, E, F, G, H, I, J, K, L, M, N, O, P, Q, R, S, U, V, W, X, Y, Z);

/// A step failed and the chain stopped.
#[derive(Debug)]
pub struct Halt {
    /// 1-based index of the step that failed.
    pub step: usize,
    /// The error the step returned.
    pub error: Error,
}

/// The non-terminal steps of a chain.
///
/// `run` executes every step in ascending order and returns the tuple of
/// their outputs, or the first failure.
pub trait Steps<Cx>: Send + Sync + 'static {
    /// Tuple of all step outputs, in order.
    type Output;

    /// Number of steps.
    const LEN: usize;

    /// Runs every step against `cx`.
    fn run(&self, cx: &mut Cx) -> Result<Self::Output, Halt>;
}

/// The empty start of a chain. Produces `()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Start;

impl<Cx> Steps<Cx> for Start {
    type Output = ();

    const LEN: usize = 0;

    fn run(&self, _cx: &mut Cx) -> Result<(), Halt> {
        Ok(())
    }
}

/// A step appended after `S`, producing a `T`.
pub struct Then<S, F, T> {
    prev: S,
    step: F,
    _output: PhantomData<fn() -> T>,
}

impl<S, F, T> fmt::Debug for Then<S, F, T>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Then")
            .field("prev", &self.prev)
            .field("output", &std::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}

impl<Cx, S, F, T> Steps<Cx> for Then<S, F, T>
where
    S: Steps<Cx>,
    S::Output: Append<T>,
    F: Fn(&mut Cx, &S::Output) -> StepResult<T> + Send + Sync + 'static,
    T: 'static,
{
    type Output = <S::Output as Append<T>>::Output;

    const LEN: usize = S::LEN + 1;

    fn run(&self, cx: &mut Cx) -> Result<Self::Output, Halt> {
        let outputs = self.prev.run(cx)?;
        match (self.step)(cx, &outputs) {
            Ok(value) => Ok(outputs.append(value)),
            Err(error) => Err(Halt {
                step: Self::LEN,
                error,
            }),
        }
    }
}

/// Builder for a chain of steps over the context type `Cx`.
///
/// `Cx` is [`Exchange`](crate::exchange::Exchange) for plain chains and
/// [`Traced`](crate::traced::Traced) for chains that receive a reporting
/// scope and a root span.
pub struct Chain<Cx, S = Start> {
    steps: S,
    _cx: PhantomData<fn(&mut Cx)>,
}

impl<Cx, S: fmt::Debug> fmt::Debug for Chain<Cx, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("steps", &self.steps).finish()
    }
}

impl<Cx> Chain<Cx, Start> {
    /// Starts an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Start,
            _cx: PhantomData,
        }
    }
}

impl<Cx> Default for Chain<Cx, Start> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cx, S> Chain<Cx, S>
where
    S: Steps<Cx>,
{
    /// Appends a non-terminal step.
    ///
    /// The step receives the context and the outputs of every earlier step,
    /// and produces a value for the steps after it.
    #[must_use]
    pub fn then<T, F>(self, step: F) -> Chain<Cx, Then<S, F, T>>
    where
        S::Output: Append<T>,
        F: Fn(&mut Cx, &S::Output) -> StepResult<T> + Send + Sync + 'static,
        T: 'static,
    {
        Chain {
            steps: Then {
                prev: self.steps,
                step,
                _output: PhantomData,
            },
            _cx: PhantomData,
        }
    }

    /// Finishes the chain with its terminal step.
    ///
    /// The terminal step produces no value, only success or an error.
    #[must_use]
    pub fn handle<F>(self, terminal: F) -> Pipeline<Cx, S, F>
    where
        F: Fn(&mut Cx, &S::Output) -> StepResult<()> + Send + Sync + 'static,
    {
        Pipeline::new(self.steps, terminal)
    }

    /// Returns the number of steps added so far.
    #[must_use]
    pub fn step_count(&self) -> usize {
        S::LEN
    }
}

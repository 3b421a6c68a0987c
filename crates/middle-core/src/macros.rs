//! One-call chain builders.

/// Builds a plain pipeline from its steps in one call.
///
/// Every argument but the last becomes a [`then`](crate::chain::Chain::then)
/// step; the last one is the terminal step. A single argument builds a
/// one-step chain whose only step receives `&()`.
///
/// # Example
///
/// ```
/// use middle_core::chain;
/// use middle_core::pipeline::Handler;
///
/// let handler = chain!(
///     |_ex, ()| Ok(42),
///     |ex, (answer,)| {
///         ex.response_mut().write_str(&answer.to_string());
///         Ok(())
///     },
/// );
///
/// let request = http::Request::get("/").body(bytes::Bytes::new()).unwrap();
/// assert_eq!(handler.call(request).status(), 200);
/// ```
#[macro_export]
macro_rules! chain {
    ($($step:expr),+ $(,)?) => {
        $crate::__chain_build!(
            $crate::chain::Chain::<$crate::exchange::Exchange>::new();
            $($step),+
        )
    };
}

/// Builds a pipeline over [`Traced`](crate::traced::Traced) from its steps.
///
/// The reporter type comes first, separated from the steps by `;`. Call
/// [`instrument`](crate::pipeline::Pipeline::instrument) on the result to
/// get a handler.
///
/// # Example
///
/// ```
/// use middle_core::fixtures::RecordingReporter;
/// use middle_core::traced_chain;
///
/// let handler = traced_chain!(RecordingReporter;
///     |cx, ()| Ok(cx.method().clone()),
///     |_cx, (_method,)| Ok(()),
/// )
/// .instrument(RecordingReporter::new());
/// # let _ = handler;
/// ```
#[macro_export]
macro_rules! traced_chain {
    ($reporter:ty; $($step:expr),+ $(,)?) => {
        $crate::__chain_build!(
            $crate::chain::Chain::<$crate::traced::Traced<$reporter>>::new();
            $($step),+
        )
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __chain_build {
    ($builder:expr; $last:expr) => {
        $builder.handle($last)
    };
    ($builder:expr; $head:expr, $($rest:expr),+) => {
        $crate::__chain_build!($builder.then($head); $($rest),+)
    };
}

//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when reducers hand async work to the
//! runtime.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use rollcall_core::async_effect;
///
/// async_effect! {
///     let outcome = coordinator.admit(candidate, policy).await;
///     Some(LedgerAction::from_admission(request_id, outcome))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Builds an effect dependency list.
///
/// Every entry is converted with [`PropValue::from`](crate::PropValue), and the
/// result is wrapped in `Some` so it can be passed straight to
/// [`Hooks::use_effect`](crate::Hooks::use_effect).
///
/// # Usage
///
/// ```ignore
/// hooks.use_effect(deps![count, "title"], move || {
///     tracing::info!(count, "count changed");
///     None
/// })?;
///
/// // Runs once, after the first commit.
/// hooks.use_effect(deps![], || None)?;
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        ::core::option::Option::Some($crate::Deps::new())
    };
    ($($value:expr),+ $(,)?) => {
        ::core::option::Option::Some(::std::vec![$($crate::PropValue::from($value)),+])
    };
}

/// Implements `Debug` for a handle type by printing its type name only.
macro_rules! impl_debug {
    ($ty:ty) => {
        impl core::fmt::Debug for $ty {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(core::any::type_name::<Self>())
            }
        }
    };
}

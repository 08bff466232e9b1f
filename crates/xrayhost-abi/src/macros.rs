//! Helper macros for ABI function generation.
//!
//! Provides the `abi_fn!` macro that generates `#[unsafe(no_mangle)] pub unsafe extern "system" fn`
//! exports. `"system"` is `__stdcall` on 32-bit Windows and the C convention everywhere else,
//! which is what existing consumers of the `XH_*` header expect.

/// Generate an exported `extern "system"` function.
///
/// # Usage
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn XH_Something(arg1: Type1) -> ReturnType {
///         // implementation body
///     }
/// }
/// ```
///
/// The body runs inside an `unsafe` block; pointer arguments must be converted
/// through the helpers in `util` before use.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[allow(non_snake_case)]
        #[unsafe(no_mangle)]
        pub unsafe extern "system" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };
}

#[allow(unused_imports)]
pub(crate) use abi_fn;

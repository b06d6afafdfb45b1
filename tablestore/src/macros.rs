//! Shorthands for building and returning [`crate::error::TableError`] values.

/// Creates a [`crate::error::TableError`] from a kind, a static description and optional detail.
///
/// Use `detail = expr` to move an owned [`String`] in, or a plain third argument to have it
/// formatted with `to_string()`. A trailing `source: expr` attaches the originating error.
#[macro_export]
macro_rules! table_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::TableError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::TableError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::TableError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::TableError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::TableError::from(($kind, $desc, $detail.to_string())).with_source($source)
    };
}

/// Returns early with a [`crate::error::TableError`], accepting the same forms as [`table_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::table_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::table_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::table_error!($kind, $desc, $detail))
    };
}

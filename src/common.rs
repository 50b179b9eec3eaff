pub(crate) mod error;

#[cfg(test)]
pub(crate) mod test_utils;

/// Converts a callback failure into the crate error, logging it when the
/// `logging` feature is enabled.
pub(crate) fn callback_error(source: error::BoxError, _what: &'static str) -> error::Error {
    #[cfg(feature = "logging")]
    log::warn!("Entry descriptor callback `{_what}` failed: {source}");

    error::Error::Callback(source)
}

use icu_normalizer::DecomposingNormalizer;

/// Container for a prebuilt Unicode normalizer so we're not forced to
/// load the decomposition data repetitively.
///
/// Stored field values are kept in canonical decomposed form (NFD), so
/// search patterns are decomposed the same way before comparison.
pub struct Normalizer {
    nfd: DecomposingNormalizer,
}

impl Normalizer {
    pub fn new() -> Normalizer {
        Normalizer {
            nfd: DecomposingNormalizer::new_nfd(),
        }
    }

    pub fn nfd_once(value: &str) -> String {
        Normalizer::new().nfd(value)
    }

    /// Decompose a string to NFD.
    ///
    /// ```
    /// use lingdb::norm::Normalizer;
    ///
    /// // U+00E9 decomposes to "e" plus U+0301 combining acute.
    /// let normalizer = Normalizer::new();
    /// assert_eq!(normalizer.nfd("caf\u{00e9}"), "cafe\u{0301}");
    /// assert_eq!(normalizer.nfd("plain"), "plain");
    /// ```
    pub fn nfd(&self, value: &str) -> String {
        self.nfd.normalize(value)
    }
}

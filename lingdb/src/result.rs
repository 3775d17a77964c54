//! Common result type for methods/functions which may return a `Result`.

use crate::search::SearchParseError;
use std::fmt;

/// This is a convenient way to set the error type to LdbError on common
/// method/function responses to simplify the declaration of return types.
/// ```
/// use lingdb::result::*;
/// use lingdb::search::SearchParseError;
///
/// let res = LdbResult::Ok("Hello");
/// assert_eq!(res.unwrap(), "Hello");
///
/// fn foo1() -> LdbResult<()> {
///   let mut perr = SearchParseError::new();
///   perr.add("Form.foo", "Searching on Form.foo is not permitted");
///   let err = LdbError::from_search(perr);
///   Err(err)
/// }
///
/// // Same result as above.
/// fn foo2() -> LdbResult<()> {
///   let mut perr = SearchParseError::new();
///   perr.add("Form.foo", "Searching on Form.foo is not permitted");
///   Err(perr.into())
/// }
///
/// if let LdbError::Search(e) = foo1().err().unwrap() {
///     assert_eq!(e.get("Form.foo").unwrap(), "Searching on Form.foo is not permitted");
/// } else {
///     panic!("unexpected response");
/// }
///
/// if let LdbError::Search(e) = foo2().err().unwrap() {
///     assert_eq!(e.len(), 1);
/// } else {
///     panic!("unexpected response");
/// }
/// ```
pub type LdbResult<T> = std::result::Result<T, LdbError>;

#[derive(Debug, Clone)]
pub enum LdbError {
    /// General error/failure messages that are not linked to a
    /// SearchParseError.
    ///
    /// Covers failures of the surrounding machinery, e.g. an unreadable
    /// request body or an unrenderable descriptor.
    Debug(Box<String>),
    Search(Box<SearchParseError>),
}

impl std::error::Error for LdbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl LdbError {
    /// Coerce the LdbError into a SearchParseError regardless of its
    /// internal type.
    ///
    /// If the error is a Debug(string) type, return a new parse error
    /// whose mapping carries the error string under the generic "error"
    /// key. Otherwise, return a copy of the contained parse error.
    pub fn search_or_default(&self) -> SearchParseError {
        match self {
            LdbError::Search(e) => *e.clone(),
            LdbError::Debug(s) => {
                let mut perr = SearchParseError::new();
                perr.add("error", &format!("Search Error: {s}"));
                perr
            }
        }
    }

    pub fn from_search(e: SearchParseError) -> LdbError {
        Self::Search(Box::new(e))
    }

    pub fn from_string(s: String) -> LdbError {
        Self::Debug(Box::new(s))
    }
}

impl fmt::Display for LdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Debug(ref m) => write!(f, "{m}"),
            Self::Search(ref e) => write!(f, "{e}"),
        }
    }
}

/// Useful for translating generic Err(String)'s into LdbError's
impl From<String> for LdbError {
    fn from(msg: String) -> Self {
        LdbError::from_string(msg)
    }
}

impl From<&str> for LdbError {
    fn from(msg: &str) -> Self {
        LdbError::from_string(msg.to_string())
    }
}

/// Useful for translating LdbError's into plain strings for
/// methods/functions that return vanilla Result<T, String>
impl From<LdbError> for String {
    fn from(err: LdbError) -> Self {
        match err {
            LdbError::Debug(m) => m.to_string(),
            LdbError::Search(e) => e.to_string(),
        }
    }
}

/// Useful for translating SearchParseErrors that are returned as Err's
/// into fully-fledged Err(LdbError) responses.
impl From<SearchParseError> for LdbError {
    fn from(e: SearchParseError) -> Self {
        LdbError::from_search(e)
    }
}

/// ```
/// use lingdb::result::*;
/// use lingdb::search::SearchParseError;
///
/// fn foo() -> Result<(), LdbError> {
///     let mut perr = SearchParseError::new();
///     perr.add("OrderByError", "The provided order by expression was invalid.");
///     Err((&perr).into())
/// }
///
/// if let Err(e) = foo() {
///     if let LdbError::Search(pe) = e {
///         assert!(pe.get("OrderByError").is_some());
///     } else {
///         panic!("Unexpected LdbError type: {}", e);
///     }
/// } else {
///     panic!("Unexpected result type");
/// }
/// ```
impl From<&SearchParseError> for LdbError {
    fn from(e: &SearchParseError) -> Self {
        LdbError::from_search(e.clone())
    }
}

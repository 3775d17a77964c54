pub use query::CompiledSearch;
pub use query::Pager;
pub use result::LdbError;
pub use result::LdbResult;
pub use schema::Registry;
pub use search::SearchCompiler;
pub use search::SearchParseError;
pub use sql::SqlRenderer;

pub mod date;
pub mod init;
pub mod logging;
pub mod norm;
pub mod query;
pub mod result;
pub mod schema;
pub mod search;
pub mod sql;
pub mod util;

#[cfg(test)]
mod tests;

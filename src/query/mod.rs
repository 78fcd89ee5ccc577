//! Typed query builders - select and delete over registered tables.
//!
//! Both builders share the flat predicate chain in `predicate`; `select` adds
//! paging, counting, and lazy expiry, `delete` adds cascading removal of
//! descendant rows through dynamic type tags.

pub mod delete;
pub mod predicate;
pub mod select;

pub use delete::Delete;
pub use select::Select;

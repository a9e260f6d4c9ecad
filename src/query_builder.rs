//! Placeholder fragments for parameterized INSERT statements.
//!
//! ```
//! use mysql_datastore::query_builder::{prepare_batch_insert_columns, prepare_insert_column};
//!
//! let sql = format!(
//!     "INSERT INTO users (id, name) VALUES {}",
//!     prepare_batch_insert_columns(2, 2)
//! );
//! assert_eq!(sql, "INSERT INTO users (id, name) VALUES (?,?),(?,?)");
//! assert_eq!(prepare_insert_column(3), "(?,?,?)");
//! ```

use std::iter;

/// A parenthesized group of `columns` positional placeholders.
///
/// `0` yields `()`.
pub fn prepare_insert_column(columns: usize) -> String {
    let mut group = String::with_capacity(columns * 2 + 1);
    group.push('(');
    group.push_str(&vec!["?"; columns].join(","));
    group.push(')');
    group
}

/// `rows` comma-joined copies of [`prepare_insert_column`]`(columns)`.
///
/// `0` rows yields an empty string.
pub fn prepare_batch_insert_columns(rows: usize, columns: usize) -> String {
    let group = prepare_insert_column(columns);
    iter::repeat_n(group.as_str(), rows)
        .collect::<Vec<_>>()
        .join(",")
}

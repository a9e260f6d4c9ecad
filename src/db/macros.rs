//! Convenience macros for building statement parameters.

/// Build a `Vec<QueryParam>` from heterogeneous values.
///
/// Each value is converted with `QueryParam::from`, so anything with a
/// `From` impl (integers, floats, strings, byte vectors, options, JSON) can be
/// mixed freely.
///
/// # Example
///
/// ```
/// use mysql_datastore::params;
/// use mysql_datastore::models::QueryParam;
///
/// let params = params![1, "alice", None::<i64>];
/// assert_eq!(params[2], QueryParam::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::models::QueryParam>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::models::QueryParam::from($value)),+]
    };
}

#[cfg(test)]
mod tests {
    use crate::models::QueryParam;

    #[test]
    fn test_params_macro_empty() {
        let params = params![];
        assert!(params.is_empty());
    }

    #[test]
    fn test_params_macro_mixed() {
        let params = params![1, "alice", 2.5, true, None::<String>];
        assert_eq!(
            params,
            vec![
                QueryParam::Int(1),
                QueryParam::String("alice".to_string()),
                QueryParam::Float(2.5),
                QueryParam::Bool(true),
                QueryParam::Null,
            ]
        );
    }
}

use super::Filter;
use crate::Bins;

/// Query statement parameters.
#[derive(Clone, Debug)]
pub struct Statement {
    pub namespace: String,
    pub set_name: String,
    /// Name of the secondary index to use. The server picks the index by the filter's bin if not
    /// set.
    pub index_name: Option<String>,
    /// Bins to return for each matching record.
    pub bins: Bins,
    /// Secondary index filter. Without a filter, the query visits all records of the set, like
    /// a scan.
    pub filter: Option<Filter>,
}

impl Statement {
    /// Create a new query statement with the given namespace, set name and optional list of bin
    /// names.
    ///
    /// # Examples
    ///
    /// Create a new statement to query the namespace "foo" and set "bar" and return the "name" and
    /// "age" bins for each matching record.
    ///
    /// ```rust
    /// use windpike::{query::{Filter, Statement}, Bins};
    ///
    /// let stmt = Statement::new("foo", "bar", Bins::from(["name", "age"]))
    ///     .with_filter(Filter::range("age", 18, 30));
    /// ```
    #[must_use]
    pub fn new(namespace: &str, set_name: &str, bins: Bins) -> Self {
        Self {
            namespace: namespace.to_owned(),
            set_name: set_name.to_owned(),
            bins,
            index_name: None,
            filter: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_index_name(mut self, index_name: &str) -> Self {
        self.index_name = Some(index_name.to_owned());
        self
    }
}

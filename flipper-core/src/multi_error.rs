//! Aggregation of errors produced by one fan-out.
//!
//! The first error added is kept whole, so its source chain stays walkable
//! through [`std::error::Error::source`]. Every later error contributes only
//! its message. `MultiError` is not synchronized: concurrent producers send
//! their results to a single owner that calls [`MultiError::add`].

use std::error::Error;
use std::fmt;

/// Separator used by the single-line `Display` form.
pub const FRAGMENT_SEPARATOR: &str = "|";

type BoxError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Default)]
pub struct MultiError {
    base: Option<BoxError>,
    rest: Vec<String>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one error has been added.
    pub fn is_set(&self) -> bool {
        self.base.is_some()
    }

    /// Number of captured errors.
    pub fn len(&self) -> usize {
        match self.base {
            Some(_) => 1 + self.rest.len(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_set()
    }

    /// Record `err`. The first error becomes the base.
    pub fn add(&mut self, err: impl Into<BoxError>) {
        let err = err.into();
        if self.base.is_none() {
            self.base = Some(err);
        } else {
            self.rest.push(err.to_string());
        }
    }

    /// Record the error side of `result`; `Ok` is a no-op.
    pub fn add_result<T, E: Into<BoxError>>(&mut self, result: Result<T, E>) {
        if let Err(err) = result {
            self.add(err);
        }
    }

    /// Record an optional error; `None` is a no-op.
    pub fn add_opt<E: Into<BoxError>>(&mut self, err: Option<E>) {
        if let Some(err) = err {
            self.add(err);
        }
    }

    /// Messages of every captured error, in insertion order.
    pub fn fragments(&self) -> Vec<String> {
        self.base
            .iter()
            .map(|base| base.to_string())
            .chain(self.rest.iter().cloned())
            .collect()
    }

    /// Multi-line report: one captured error per line.
    pub fn render(&self) -> String {
        self.fragments().join("\n")
    }

    /// `Ok(())` when nothing was captured, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_set() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fragments().join(FRAGMENT_SEPARATOR))
    }
}

impl Error for MultiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.base.as_deref().map(|base| base as &(dyn Error + 'static))
    }
}

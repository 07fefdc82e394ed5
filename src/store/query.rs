//! Key matching and pagination shared by the ordered backends.
//!
//! Backends feed candidates in ascending key order starting at
//! [`KeyMatch::lower_bound`], stop as soon as [`KeyMatch::in_range`] fails,
//! keep the live entries that satisfy [`KeyMatch::matches`], and finally cut
//! the sequence with a [`Window`].

use super::types::{ListOptions, ReadOptions};

/// Which keys a read or list selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyMatch<'a> {
    /// A single key, compared for equality.
    Exact(&'a str),
    /// Anchored start and/or end; `None` is a wildcard for that side.
    Pattern {
        prefix: Option<&'a str>,
        suffix: Option<&'a str>,
    },
}

impl<'a> KeyMatch<'a> {
    pub(crate) fn for_read(key: &'a str, opts: &ReadOptions) -> Self {
        if opts.is_exact() {
            Self::Exact(key)
        } else {
            Self::Pattern {
                prefix: opts.prefix.then_some(key),
                suffix: opts.suffix.then_some(key),
            }
        }
    }

    pub(crate) fn for_list(opts: &'a ListOptions) -> Self {
        Self::Pattern {
            prefix: opts.prefix.as_deref(),
            suffix: opts.suffix.as_deref(),
        }
    }

    /// First key an ordered scan has to look at.
    pub(crate) fn lower_bound(&self) -> &'a str {
        match *self {
            Self::Exact(key) => key,
            Self::Pattern { prefix, .. } => prefix.unwrap_or(""),
        }
    }

    /// False once an ordered scan has moved past every possible match.
    pub(crate) fn in_range(&self, candidate: &str) -> bool {
        match *self {
            Self::Exact(key) => candidate == key,
            Self::Pattern {
                prefix: Some(prefix),
                ..
            } => candidate.starts_with(prefix),
            Self::Pattern { prefix: None, .. } => true,
        }
    }

    pub(crate) fn matches(&self, candidate: &str) -> bool {
        match *self {
            Self::Exact(key) => candidate == key,
            Self::Pattern { prefix, suffix } => {
                prefix.is_none_or(|p| candidate.starts_with(p))
                    && suffix.is_none_or(|s| candidate.ends_with(s))
            },
        }
    }

    pub(crate) fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// Offset/limit window over an ordered match sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    offset: usize,
    limit: usize,
}

impl Window {
    /// `limit == 0` means unbounded.
    pub(crate) fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// Number of leading matches needed to fill the window, if bounded.
    pub(crate) fn end(self) -> Option<usize> {
        (self.limit > 0).then(|| self.offset.saturating_add(self.limit))
    }

    pub(crate) fn apply<I: Iterator>(self, iter: I) -> impl Iterator<Item = I::Item> {
        let take = if self.limit == 0 {
            usize::MAX
        } else {
            self.limit
        };
        iter.skip(self.offset).take(take)
    }
}

impl From<&ReadOptions> for Window {
    fn from(opts: &ReadOptions) -> Self {
        Self::new(opts.offset, opts.limit)
    }
}

impl From<&ListOptions> for Window {
    fn from(opts: &ListOptions) -> Self {
        Self::new(opts.offset, opts.limit)
    }
}

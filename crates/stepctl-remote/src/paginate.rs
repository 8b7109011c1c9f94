//! Cursor-following pagination over list operations.
//!
//! Every "list all X" call on the remote services returns a page of items
//! plus an optional continuation token. [`paginate`] turns such a call into a
//! flat stream of items. The stream ends when the service returns no token,
//! or when it echoes back the token it was just given.

use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::warn;

use crate::error::{RemoteError, Result};

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Token for the next page, if any.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    /// A final page with no continuation.
    #[must_use]
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    /// A page followed by another.
    #[must_use]
    pub fn with_next(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(next_token.into()),
        }
    }
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Stream every item across all pages returned by `fetch`.
///
/// `fetch` receives the continuation token (`None` for the first page).
pub fn paginate<T, F, Fut>(fetch: F) -> impl Stream<Item = Result<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    stream::try_unfold((fetch, Cursor::Start), |(mut fetch, cursor)| async move {
        let token = match cursor {
            Cursor::Done => return Ok::<_, RemoteError>(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        let page = fetch(token.clone()).await?;

        let next = match page.next_token.filter(|t| !t.is_empty()) {
            None => Cursor::Done,
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                warn!(token = %next, "Service returned the same page token twice, ending listing");
                Cursor::Done
            }
            Some(next) => Cursor::Next(next),
        };

        let items = stream::iter(page.items.into_iter().map(Ok::<T, RemoteError>));
        Ok(Some((items, (fetch, next))))
    })
    .try_flatten()
}

/// Collect every item across all pages.
///
/// # Errors
///
/// Returns the first error raised by `fetch`.
pub async fn collect_all<T, F, Fut>(fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    paginate(fetch).try_collect().await
}

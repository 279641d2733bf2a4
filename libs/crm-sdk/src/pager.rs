//! Page-number pagination as a `Stream`.
//!
//! Turns a page-fetching function into a stream of pages or items. The
//! pager advances the page number and threads the service's paging cookie
//! into the next request, so callers never touch either.
//!
//! ```rust,ignore
//! use futures_util::TryStreamExt;
//!
//! let active: Vec<Contact> = ctx
//!     .set::<Contact>()?
//!     .filter_and(|c| { c.equal(contact::state_code(), 0); })?
//!     .items(500)
//!     .try_collect()
//!     .await?;
//! ```

use crate::error::Error;
use crm_query::{Page, Paging, QuerySpec};
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Where the next request starts.
#[derive(Debug)]
struct Cursor {
    paging: Paging,
    cookie: Option<String>,
}

impl Cursor {
    fn apply(&self, base: &QuerySpec) -> QuerySpec {
        base.clone()
            .with_paging(self.paging)
            .with_paging_cookie(self.cookie.clone())
    }

    /// Cursor after `page`, or `None` when it was the last one.
    fn advance<T>(&self, page: &Page<T>) -> Option<Self> {
        if !page.page_info.has_more || page.items.is_empty() {
            return None;
        }
        Some(Self {
            paging: self.paging.next(),
            cookie: page.page_info.paging_cookie.clone(),
        })
    }
}

pin_project! {
    /// Stream of whole pages.
    ///
    /// Ends after the first page the service reports as final, or after the
    /// first error.
    #[must_use = "streams do nothing unless polled"]
    pub struct PagesPager<T, F, Fut>
    where
        F: FnMut(QuerySpec) -> Fut,
        Fut: Future<Output = Result<Page<T>, Error>>,
    {
        base: QuerySpec,
        cursor: Option<Cursor>,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<T, F, Fut> PagesPager<T, F, Fut>
where
    F: FnMut(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Page<T>, Error>>,
{
    /// Start at page 1 with `page_size` rows per request.
    pub fn new(base: QuerySpec, page_size: u32, fetcher: F) -> Self {
        Self {
            base,
            cursor: Some(Cursor {
                paging: Paging::first(page_size),
                cookie: None,
            }),
            fetcher,
            current_fetch: None,
        }
    }
}

impl<T, F, Fut> Stream for PagesPager<T, F, Fut>
where
    F: FnMut(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Page<T>, Error>>,
{
    type Item = Result<Page<T>, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                let result = match fut.poll(cx) {
                    Poll::Ready(result) => result,
                    Poll::Pending => return Poll::Pending,
                };
                this.current_fetch.set(None);

                return match result {
                    Ok(page) => {
                        *this.cursor = this.cursor.take().and_then(|c| c.advance(&page));
                        Poll::Ready(Some(Ok(page)))
                    }
                    Err(e) => {
                        *this.cursor = None;
                        Poll::Ready(Some(Err(e)))
                    }
                };
            }

            let Some(cursor) = this.cursor.as_ref() else {
                return Poll::Ready(None);
            };
            let fut = (this.fetcher)(cursor.apply(this.base));
            this.current_fetch.set(Some(fut));
        }
    }
}

pin_project! {
    /// Stream of individual rows across pages.
    #[must_use = "streams do nothing unless polled"]
    pub struct ItemsPager<T, F, Fut>
    where
        F: FnMut(QuerySpec) -> Fut,
        Fut: Future<Output = Result<Page<T>, Error>>,
    {
        #[pin]
        pages: PagesPager<T, F, Fut>,
        buffer: VecDeque<T>,
    }
}

impl<T, F, Fut> ItemsPager<T, F, Fut>
where
    F: FnMut(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Page<T>, Error>>,
{
    pub fn new(base: QuerySpec, page_size: u32, fetcher: F) -> Self {
        Self {
            pages: PagesPager::new(base, page_size, fetcher),
            buffer: VecDeque::new(),
        }
    }
}

impl<T, F, Fut> Stream for ItemsPager<T, F, Fut>
where
    F: FnMut(QuerySpec) -> Fut,
    Fut: Future<Output = Result<Page<T>, Error>>,
{
    type Item = Result<T, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            match this.pages.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(page))) => this.buffer.extend(page.items),
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

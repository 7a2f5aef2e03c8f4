//! Page-numbered listing.
//!
//! List endpoints answer with an envelope of the form
//! `{"data": [...], "page": 1, "pages": 3, "results": 250}`. A [`PageStream`]
//! walks those pages in order, one request at a time, yielding items lazily.
//! The termination rules live in [`Paginator`], which never touches the
//! network.

use std::collections::VecDeque;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::metadata::RequestMetadata;
use crate::{Error, Result};

/// Smallest page size the provider accepts.
pub const MIN_PAGE_SIZE: u32 = 25;

/// Largest page size the provider accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Page size used when neither the client nor the call sets one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Header carrying the JSON filter for list requests.
pub const FILTER_HEADER: &str = "X-Filter";

/// Pagination metadata from a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// The 1-based number of this page.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of results across all pages.
    pub results: u64,
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items on this page, in server order.
    pub data: Vec<T>,
    /// The 1-based number of this page.
    pub page: u32,
    /// Total number of pages.
    pub pages: u32,
    /// Total number of results across all pages.
    pub results: u64,
}

impl<T> Page<T> {
    /// The page's pagination metadata.
    pub fn descriptor(&self) -> PageDescriptor {
        PageDescriptor {
            page: self.page,
            pages: self.pages,
            results: self.results,
        }
    }
}

/// Per-call listing options.
///
/// # Examples
///
/// ```
/// use linode_rest::ListOptions;
/// use serde_json::json;
///
/// let options = ListOptions::new()
///     .page_size(25)
///     .max_results(60)
///     .filter(json!({"restricted": true}));
/// assert_eq!(options.page_size, Some(25));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Items per page; falls back to the client's default.
    pub page_size: Option<u32>,
    /// Stop after this many items, even mid-page.
    pub max_results: Option<usize>,
    /// A provider filter expression, sent in the `X-Filter` header.
    pub filter: Option<serde_json::Value>,
}

impl ListOptions {
    /// Options with every field unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Caps the number of items returned.
    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: serde_json::Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Resolves the page size and attaches the filter header.
    pub(crate) fn apply(
        &self,
        metadata: RequestMetadata,
        default_page_size: u32,
    ) -> Result<(RequestMetadata, u32)> {
        let page_size = self.page_size.unwrap_or(default_page_size);
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::InvalidArgument(format!(
                "page size must be between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, page_size
            )));
        }

        let metadata = match &self.filter {
            Some(filter) => metadata.with_header(FILTER_HEADER, filter.to_string())?,
            None => metadata,
        };

        Ok((metadata, page_size))
    }
}

/// Decides which page to fetch next and how much of each page to keep.
///
/// Starts at page 1 and stops after the last page or once `max_results`
/// items have been kept, truncating the final page so the limit is met
/// exactly.
#[derive(Debug, Clone)]
pub struct Paginator {
    page_size: u32,
    max_results: Option<usize>,
    next_page: Option<u32>,
    yielded: usize,
}

impl Paginator {
    /// A paginator positioned before page 1.
    pub fn new(page_size: u32, max_results: Option<usize>) -> Self {
        let next_page = if max_results == Some(0) { None } else { Some(1) };
        Self {
            page_size,
            max_results,
            next_page,
            yielded: 0,
        }
    }

    /// The page size to request.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The page to request next, or `None` when finished.
    pub fn next_page(&self) -> Option<u32> {
        self.next_page
    }

    /// Returns `true` once no more pages will be requested.
    pub fn is_done(&self) -> bool {
        self.next_page.is_none()
    }

    /// Items accepted so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Absorbs the response to page `requested` and returns the items to
    /// hand to the caller.
    pub fn accept<T>(&mut self, requested: u32, page: Page<T>) -> Vec<T> {
        let pages = page.pages;
        let mut items = page.data;

        if let Some(max) = self.max_results {
            items.truncate(max.saturating_sub(self.yielded));
        }
        self.yielded += items.len();

        let limit_reached = self.max_results.is_some_and(|max| self.yielded >= max);
        self.next_page = if limit_reached || requested >= pages {
            None
        } else {
            Some(requested + 1)
        };

        items
    }
}

/// Builds the request for one page.
pub(crate) fn page_metadata(base: &RequestMetadata, page: u32, page_size: u32) -> RequestMetadata {
    base.clone()
        .with_query_param("page", page.to_string())
        .with_query_param("page_size", page_size.to_string())
}

/// A lazy, finite sequence of items drawn from consecutive pages.
///
/// Pages are fetched sequentially and only when the buffered items run out.
/// Dropping the stream early needs no cleanup. Each stream starts from
/// page 1; nothing is shared between streams.
///
/// # Examples
///
/// ```no_run
/// use linode_rest::{Client, ListOptions};
///
/// # async fn example() -> Result<(), linode_rest::Error> {
/// let client = Client::builder().token("my-token").build()?;
///
/// let mut users = client.users().stream(Some(&ListOptions::new().page_size(25)))?;
/// while let Some(user) = users.next().await? {
///     if user.restricted {
///         println!("first restricted user: {}", user.username);
///         break;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct PageStream<T> {
    client: Client,
    metadata: RequestMetadata,
    paginator: Paginator,
    buffer: VecDeque<T>,
}

impl<T: DeserializeOwned> PageStream<T> {
    pub(crate) fn new(
        client: Client,
        metadata: RequestMetadata,
        options: Option<&ListOptions>,
    ) -> Result<Self> {
        let options = options.cloned().unwrap_or_default();
        let (metadata, page_size) = options.apply(metadata, client.default_page_size())?;

        Ok(Self {
            client,
            metadata,
            paginator: Paginator::new(page_size, options.max_results),
            buffer: VecDeque::new(),
        })
    }

    /// Fetch the next item, requesting new pages as needed.
    ///
    /// Returns `Ok(None)` when the listing is exhausted or the item limit is
    /// reached.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let Some(page) = self.paginator.next_page() else {
                return Ok(None);
            };

            let fetched = self.fetch_page(page).await?;
            tracing::debug!(
                path = %self.metadata.path,
                page = fetched.page,
                pages = fetched.pages,
                results = fetched.results,
                "Fetched page"
            );

            let items = self.paginator.accept(page, fetched);
            self.buffer.extend(items);
        }
    }

    /// Collect all remaining items into a `Vec`.
    ///
    /// A failure on any page discards everything gathered so far.
    pub async fn collect(mut self) -> Result<Vec<T>> {
        let mut all = Vec::new();
        while let Some(item) = self.next().await? {
            all.push(item);
        }
        Ok(all)
    }

    async fn fetch_page(&self, page: u32) -> Result<Page<T>> {
        let metadata = page_metadata(&self.metadata, page, self.paginator.page_size());
        let response = self.client.call::<(), Page<T>>(metadata, None).await?;
        Ok(response.data)
    }
}

//! Incremental page loading
//!
//! A [`PageSource`] drives fetch + decode cycles for one list endpoint. Legacy
//! endpoints return everything at once, so a legacy list never has a next
//! page; enveloped pages advertise neighbours through `meta.hasPrev` and
//! `meta.hasNext`.

use async_trait::async_trait;
use partsdesk_core::{DecodedPage, PageDecoder};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tracing::{debug, instrument};

use crate::Result;
use crate::api::{ApiClient, ApiRequest};

/// 1-based page number
pub type PageKey = u32;

pub const DEFAULT_PER_PAGE: u32 = 20;

/// One loaded page and its neighbours
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub prev_key: Option<PageKey>,
    pub next_key: Option<PageKey>,
}

/// Fetches the raw body of one page
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch(&self, key: PageKey) -> Result<String>;
}

/// Derive neighbour keys for a decoded page requested as `key`
pub fn page_result<T>(page: DecodedPage<T>, key: PageKey) -> PageResult<T> {
    match page {
        DecodedPage::Legacy(items) => PageResult {
            items,
            prev_key: None,
            next_key: None,
        },
        DecodedPage::Paged(envelope) => {
            let meta = envelope.meta.unwrap_or_default();
            let current = meta
                .page
                .and_then(|p| PageKey::try_from(p).ok())
                .filter(|p| *p >= 1)
                .unwrap_or(key);
            let prev_key = (meta.has_prev == Some(true) && current > 1).then(|| current - 1);
            let next_key = if meta.has_next == Some(true) {
                current.checked_add(1)
            } else {
                None
            };
            PageResult {
                items: envelope.data,
                prev_key,
                next_key,
            }
        }
    }
}

pub struct PageSource<T, F> {
    fetcher: F,
    decoder: PageDecoder,
    _item: PhantomData<fn() -> T>,
}

impl<T, F> PageSource<T, F>
where
    T: DeserializeOwned + Send,
    F: PageFetch,
{
    pub fn new(fetcher: F) -> Self {
        Self::with_decoder(fetcher, PageDecoder::new())
    }

    pub fn with_decoder(fetcher: F, decoder: PageDecoder) -> Self {
        Self {
            fetcher,
            decoder,
            _item: PhantomData,
        }
    }

    /// Load one page. Fetch errors are returned as is; decoding never fails.
    pub async fn load(&self, key: PageKey) -> Result<PageResult<T>> {
        let body = self.fetcher.fetch(key).await?;
        let page = self.decoder.decode::<T>(&body);
        Ok(page_result(page, key))
    }

    /// Follow `next_key` from `first` until exhausted or `max_pages` pages are loaded
    pub async fn load_all(&self, first: PageKey, max_pages: usize) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut key = Some(first);
        let mut loaded = 0;

        while let Some(current) = key {
            if loaded >= max_pages {
                debug!(max_pages, "Page cap reached");
                break;
            }
            let page = self.load(current).await?;
            loaded += 1;
            items.extend(page.items);
            // Guard against a backend that keeps answering with the same page
            key = page.next_key.filter(|next| *next > current);
        }
        Ok(items)
    }
}

/// Fetches `GET {path}?page=N&perPage=M` through an [`ApiClient`]
#[derive(Debug, Clone)]
pub struct RouteFetcher {
    client: ApiClient,
    path: String,
    per_page: u32,
}

impl RouteFetcher {
    pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }
}

#[async_trait]
impl PageFetch for RouteFetcher {
    #[instrument(skip(self), fields(path = %self.path))]
    async fn fetch(&self, key: PageKey) -> Result<String> {
        let request = ApiRequest::get(self.path.as_str())
            .query("page", key)
            .query("perPage", self.per_page);
        Ok(self.client.execute(request).await?.body)
    }
}

impl ApiClient {
    /// Page source over `path` using this client's decoder aliases
    pub fn page_source<T>(&self, path: impl Into<String>) -> PageSource<T, RouteFetcher>
    where
        T: DeserializeOwned + Send,
    {
        PageSource::with_decoder(RouteFetcher::new(self.clone(), path), self.decoder().clone())
    }
}

//! Pagination math and paged results.

use crate::error::{QueryError, Result};
use crate::query::spec::SearchSpecification;
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::future::Future;

/// A 1-based page request, always valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
}

impl Pagination {
    /// Coerces the raw values: page and size are floored at 1, an absent
    /// size takes the configured default and sizes are capped at the maximum.
    pub fn new(page: Option<i64>, size: Option<i64>) -> Self {
        let max_size = i64::from((*MAX_PAGE_SIZE).max(1));
        let page = page.unwrap_or(1).clamp(1, i64::from(u32::MAX));
        let size = size
            .unwrap_or(i64::from(*DEFAULT_PAGE_SIZE))
            .clamp(1, max_size);

        Pagination {
            page: page as u32,
            size: size as u32,
        }
    }

    pub fn of(spec: &SearchSpecification) -> Self {
        Self::new(spec.page, spec.size)
    }

    /// Number of rows to skip. Never negative.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.size)
    }

    /// The 0-based page index used by backends that count pages from zero.
    pub fn index(&self) -> u32 {
        self.page - 1
    }

    /// The total implied by a short page, which makes a count query
    /// unnecessary. `None` if the page was full, or empty past the start.
    pub fn known_total(&self, fetched: usize) -> Option<u64> {
        let fetched = fetched as u64;
        if fetched >= self.limit() || (fetched == 0 && self.offset() > 0) {
            None
        } else {
            Some(self.offset() + fetched)
        }
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, pagination: Pagination, total_elements: u64) -> Self {
        Page {
            content,
            page: pagination.page,
            size: pagination.size,
            total_elements,
        }
    }

    pub fn empty(pagination: Pagination) -> Self {
        Self::new(Vec::new(), pagination, 0)
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(u64::from(self.size.max(1)))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}

/// Yields the page named by `spec` and every following page until a page
/// comes back empty or is the last one.
///
/// `fetch` runs one page query. The stream stops after the first error.
pub fn stream_pages<'a, T, F, Fut>(spec: SearchSpecification, fetch: F) -> BoxStream<'a, Result<Page<T>>>
where
    T: Send + 'a,
    F: FnMut(SearchSpecification) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>>> + Send + 'a,
{
    let pagination = Pagination::of(&spec);
    let first = SearchSpecification {
        page: Some(i64::from(pagination.page)),
        size: Some(i64::from(pagination.size)),
        ..spec
    };

    futures_util::stream::try_unfold((fetch, Some(first)), |(mut fetch, next)| async move {
        let Some(spec) = next else {
            return Ok::<_, QueryError>(None);
        };

        let page = fetch(spec.clone()).await?;
        if page.is_empty() {
            return Ok(None);
        }

        let next = page.has_next().then(|| SearchSpecification {
            page: Some(i64::from(page.page) + 1),
            ..spec
        });

        Ok(Some((page, (fetch, next))))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    #[test]
    fn zero_and_negative_values_become_one() {
        assert_eq!(Pagination::new(Some(0), Some(0)), Pagination { page: 1, size: 1 });
        assert_eq!(Pagination::new(Some(-5), Some(-1)), Pagination { page: 1, size: 1 });
        assert_eq!(Pagination::new(Some(-5), Some(-1)).offset(), 0);
    }

    #[test]
    fn absent_values_take_defaults() {
        let pagination = Pagination::new(None, None);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.size, *DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn offsets_are_zero_based() {
        let pagination = Pagination::new(Some(3), Some(25));
        assert_eq!(pagination.offset(), 50);
        assert_eq!(pagination.limit(), 25);
        assert_eq!(pagination.index(), 2);
    }

    #[test]
    fn short_pages_imply_the_total() {
        let first = Pagination::new(Some(1), Some(10));
        assert_eq!(first.known_total(0), Some(0));
        assert_eq!(first.known_total(4), Some(4));
        assert_eq!(first.known_total(10), None);

        let third = Pagination::new(Some(3), Some(10));
        assert_eq!(third.known_total(4), Some(24));
        assert_eq!(third.known_total(0), None);
    }

    #[test]
    fn sizes_are_capped() {
        let pagination = Pagination::new(Some(1), Some(i64::MAX));
        assert_eq!(pagination.size, *MAX_PAGE_SIZE);
    }

    #[test]
    fn pages_count_totals() {
        let page = Page::new(vec![1, 2], Pagination::new(Some(1), Some(2)), 5);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());

        let last = Page::new(vec![5], Pagination::new(Some(3), Some(2)), 5);
        assert!(!last.has_next());
        assert_eq!(last.map(|n| n * 10).content, vec![50]);

        assert_eq!(Page::<i32>::empty(Pagination::new(None, Some(10))).total_pages(), 0);
    }

    #[tokio::test]
    async fn streams_until_the_last_page() {
        let data: Vec<i32> = (1..=5).collect();
        let spec = SearchSpecification::new().with_page(1, 2);

        let pages: Vec<Page<i32>> = stream_pages(spec, |spec| {
            let data = data.clone();
            async move {
                let pagination = Pagination::of(&spec);
                let content = data
                    .iter()
                    .skip(pagination.offset() as usize)
                    .take(pagination.limit() as usize)
                    .copied()
                    .collect();
                Ok(Page::new(content, pagination, data.len() as u64))
            }
        })
        .try_collect()
        .await
        .unwrap();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].content, vec![5]);
    }

    #[tokio::test]
    async fn streams_stop_on_empty_pages() {
        let spec = SearchSpecification::new().with_page(4, 2);
        let pages: Vec<Page<i32>> = stream_pages(spec, |spec| async move {
            Ok(Page::new(Vec::new(), Pagination::of(&spec), 5))
        })
        .try_collect()
        .await
        .unwrap();

        assert!(pages.is_empty());
    }
}

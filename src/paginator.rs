//! Fixed-size pagination of ordered listings.
//!
//! The paginator only does arithmetic: it resolves the requested page number
//! against the total item count and yields the `LIMIT`/`OFFSET` window the
//! store should read. Lenient lookup follows the usual blog behaviour: a
//! missing or non-numeric page gives the first page, a page past the end
//! gives the last one.

use serde::Deserialize;
use std::num::IntErrorKind;

/// Query string of paginated pages (`?page=N`).
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    per_page: usize,
}

/// The slice of a listing shown on one page.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number.
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
}

/// One entry of the page navigation strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLink {
    pub number: usize,
    pub current: bool,
}

/// Window to fetch for a resolved page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: usize,
    pub num_pages: usize,
    pub limit: usize,
    pub offset: usize,
}

impl Paginator {
    pub fn new(per_page: usize) -> Self {
        Paginator {
            per_page: per_page.max(1),
        }
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Number of pages for `total` items. An empty listing still has one page.
    pub fn num_pages(&self, total: usize) -> usize {
        if total == 0 {
            1
        } else {
            total.div_ceil(self.per_page)
        }
    }

    /// Resolve a raw `page` query value into a fetch window.
    pub fn window(&self, requested: Option<&str>, total: usize) -> PageWindow {
        let num_pages = self.num_pages(total);
        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            None => 1,
            Some(Ok(n)) if n < 1 => num_pages,
            Some(Ok(n)) => usize::try_from(n).unwrap_or(usize::MAX).min(num_pages),
            // Too many digits for i64 is still a number, just past the end
            Some(Err(e))
                if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) =>
            {
                num_pages
            }
            Some(Err(_)) => 1,
        };

        PageWindow {
            number,
            num_pages,
            limit: self.per_page,
            offset: (number - 1) * self.per_page,
        }
    }
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, total: usize) -> Self {
        Page {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_other_pages(&self) -> bool {
        self.num_pages > 1
    }

    pub fn next_page_number(&self) -> usize {
        self.number + 1
    }

    pub fn previous_page_number(&self) -> usize {
        self.number.saturating_sub(1).max(1)
    }

    /// All page numbers, for the navigation strip.
    pub fn page_range(&self) -> Vec<usize> {
        (1..=self.num_pages).collect()
    }

    pub fn links(&self) -> Vec<PageLink> {
        self.page_range()
            .into_iter()
            .map(|number| PageLink {
                number,
                current: number == self.number,
            })
            .collect()
    }
}

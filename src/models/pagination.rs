//! Page arithmetic shared by every list view

use serde::Serialize;

/// Number of pages needed for `total` rows; an empty relation still has one page.
pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 || total <= 0 {
        return 1;
    }
    (total + per_page - 1) / per_page
}

/// A requested page, before it has been checked against the row count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page,
            per_page: per_page.max(1),
        }
    }

    /// Clamp the page into `1..=total_pages` for the given row count
    pub fn clamp(self, total: i64) -> Self {
        let last = total_pages(total, self.per_page);
        Self {
            page: self.page.clamp(1, last),
            per_page: self.per_page,
        }
    }

    /// Row offset of the first item on this page
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// One page of a relation
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Total rows across all pages
    pub total: i64,
    /// Current page (1-indexed, already clamped)
    pub page: i64,
    pub per_page: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            per_page: request.per_page,
        }
    }

    pub fn total_pages(&self) -> i64 {
        total_pages(self.total, self.per_page)
    }

    /// Convert items while keeping the page position
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(9, 4), 3);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(PageRequest::new(0, 10).clamp(25).page, 1);
        assert_eq!(PageRequest::new(-3, 10).clamp(25).page, 1);
        assert_eq!(PageRequest::new(2, 10).clamp(25).page, 2);
        assert_eq!(PageRequest::new(9, 10).clamp(25).page, 3);
        assert_eq!(PageRequest::new(5, 10).clamp(0).page, 1);
    }

    #[test]
    fn test_offset() {
        assert_eq!(PageRequest::new(1, 4).offset(), 0);
        assert_eq!(PageRequest::new(3, 4).offset(), 8);
    }

    #[test]
    fn test_map_keeps_position() {
        let page = Paginated::new(vec![1, 2], 12, PageRequest::new(2, 10)).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.page, 2);
        assert_eq!(page.total_pages(), 2);
    }

    proptest! {
        #[test]
        fn clamped_page_is_always_in_range(page in -50i64..500, per_page in 1i64..50, total in 0i64..2000) {
            let request = PageRequest::new(page, per_page).clamp(total);
            let last = total_pages(total, per_page);
            prop_assert!(last >= 1);
            prop_assert!(request.page >= 1 && request.page <= last);
            prop_assert!(request.offset() <= total.max(0));
        }

        #[test]
        fn pages_cover_all_rows(per_page in 1i64..50, total in 1i64..2000) {
            let pages = total_pages(total, per_page);
            prop_assert!(pages * per_page >= total);
            prop_assert!((pages - 1) * per_page < total);
        }
    }
}

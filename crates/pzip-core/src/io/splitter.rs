use crate::io::FileHandle;
use crate::telemetry;
use crate::telemetry::tags;
use crate::types::{PageTask, Result};

/// Conventional OS page size, used when no page size is configured.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Cuts files into fixed-size pages.
///
/// Every page except the last of a file is exactly `page_size` bytes long;
/// the last page holds the remainder. Empty files yield no pages at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSplitter {
    page_size: usize,
}

impl Default for PageSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PageSplitter {
    /// Creates a splitter; a zero page size is raised to one byte.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages a file of `len` bytes is cut into.
    pub fn page_count(&self, len: u64) -> u64 {
        len.div_ceil(self.page_size as u64)
    }

    /// Returns a lazy iterator over the pages of `handle`.
    pub fn pages<'a>(&self, handle: &'a FileHandle) -> Pages<'a> {
        let total = self.page_count(handle.len());
        if total == 0 {
            telemetry::increment_counter(
                tags::METRIC_SPLITTER_EMPTY_FILE_COUNT,
                1,
                &[("subsystem", "splitter"), ("op", "pages")],
            );
        }

        Pages {
            handle,
            page_size: self.page_size as u64,
            next: 0,
            total,
        }
    }
}

/// Iterator returned by [`PageSplitter::pages`].
#[derive(Debug)]
pub struct Pages<'a> {
    handle: &'a FileHandle,
    page_size: u64,
    next: u64,
    total: u64,
}

impl Iterator for Pages<'_> {
    type Item = Result<PageTask>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }

        let page_index = self.next;
        self.next += 1;

        let start = page_index * self.page_size;
        let end = start.saturating_add(self.page_size).min(self.handle.len());
        let is_last_page = self.next == self.total;

        telemetry::increment_counter(
            tags::METRIC_SPLITTER_PAGE_COUNT,
            1,
            &[("subsystem", "splitter"), ("op", "page")],
        );

        Some(
            self.handle
                .page(start, end)
                .map(|data| PageTask::new(self.handle.file_index(), page_index, data, is_last_page)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total - self.next).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Pages<'_> {}

#[cfg(test)]
mod tests {
    use super::PageSplitter;
    use crate::io::FileHandle;

    #[test]
    fn last_page_holds_the_remainder() {
        let handle = FileHandle::from_bytes(3, "mem", b"abcdefghij".to_vec());
        let pages: Vec<_> = PageSplitter::new(4)
            .pages(&handle)
            .collect::<Result<_, _>>()
            .expect("pages");

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].data(), b"ij");
        assert!(pages[2].is_last_page);
        assert!(!pages[1].is_last_page);
        assert!(pages.iter().all(|page| page.file_index == 3));
    }

    #[test]
    fn exact_multiple_has_full_last_page() {
        let handle = FileHandle::from_bytes(0, "mem", vec![7u8; 8]);
        let splitter = PageSplitter::new(4);
        assert_eq!(splitter.page_count(8), 2);
        let last = splitter.pages(&handle).last().expect("one page").expect("ok");
        assert_eq!(last.len(), 4);
        assert!(last.is_last_page);
    }

    #[test]
    fn empty_file_has_no_pages() {
        let handle = FileHandle::from_bytes(0, "mem", Vec::new());
        assert_eq!(PageSplitter::default().pages(&handle).count(), 0);
    }

    #[test]
    fn zero_page_size_is_clamped() {
        assert_eq!(PageSplitter::new(0).page_size(), 1);
    }
}

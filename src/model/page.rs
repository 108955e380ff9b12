/// One fetched page of records
///
/// `total` is only meaningful on the discovery page; later pages carry
/// records only.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(records: Vec<T>, total: Option<u64>) -> Self {
        Self { records, total }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Number of pages needed to cover `total` records at `page_size` per page
///
/// `page_size` must be non-zero; the collector validates it before calling.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

use serde::{Deserialize, Serialize};

use crate::config::PAGE_SIZE;

/// 1-based page request. Page size is fixed across all list pages.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Page {
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1 }
    }
}

impl Page {
    pub fn limit(&self) -> u32 {
        PAGE_SIZE
    }

    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(PAGE_SIZE)
    }
}

/// Pagination envelope returned alongside list results.
#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total_records: u32,
    pub total_pages: u32,
}

impl PageInfo {
    pub fn new(page: &Page, total_records: u32) -> Self {
        Self {
            page: page.page,
            per_page: PAGE_SIZE,
            total_records,
            total_pages: total_records.div_ceil(PAGE_SIZE),
        }
    }
}

/// Admin user-list filters: all optional, ANDed together when present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    pub role: Option<String>,
    pub status: Option<String>,
    /// Substring match against name or email.
    pub search: Option<String>,
}

/// Prescription-list filters, shared by the admin and doctor list pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionFilter {
    pub status: Option<String>,
    pub doctor_id: Option<i64>,
    pub patient_id: Option<i64>,
    /// Inclusive creation-date bounds, YYYY-MM-DD.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(Page { page: 1 }.offset(), 0);
        assert_eq!(Page { page: 3 }.offset(), 2 * PAGE_SIZE);
        // Page 0 is treated as page 1
        assert_eq!(Page { page: 0 }.offset(), 0);
    }

    #[test]
    fn offset_saturates_on_huge_page_numbers() {
        assert_eq!(Page { page: u32::MAX }.offset(), u32::MAX);
    }

    #[test]
    fn page_info_rounds_up() {
        let info = PageInfo::new(&Page { page: 1 }, 21);
        assert_eq!(info.total_pages, 3);
        let empty = PageInfo::new(&Page { page: 1 }, 0);
        assert_eq!(empty.total_pages, 0);
    }
}

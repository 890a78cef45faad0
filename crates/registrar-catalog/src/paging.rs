//! Pagination helpers.

use crate::error::{CatalogError, Result};

/// Computes the `(offset, limit)` window for a page of `total` items.
///
/// Pages are 1-based. Page 1 of an empty set is valid and yields `(0, 0)`.
pub fn page_bounds(
    total: usize,
    page: usize,
    per_page: usize,
    max_per_page: usize,
) -> Result<(usize, usize)> {
    if page < 1 {
        return Err(CatalogError::bad_request("page number must be positive"));
    }
    if per_page < 1 || per_page > max_per_page {
        return Err(CatalogError::bad_request(format!(
            "per_page must be between 1 and {max_per_page}"
        )));
    }

    let offset = (page - 1)
        .checked_mul(per_page)
        .ok_or_else(|| CatalogError::bad_request("page number out of range"))?;
    if offset > 0 && offset >= total {
        return Err(CatalogError::bad_request(format!(
            "page {page} is out of range for {total} items"
        )));
    }

    let limit = per_page.min(total - offset.min(total));
    Ok((offset, limit))
}

//! Read-contract orderings, shared so both backends sort identically.
//!
//! The relational backend expresses these as SQL `ORDER BY` clauses; the
//! comparators here are the in-memory equivalents and the reference for
//! what those clauses must produce.

use crate::contract::{SearchQuery, SortBy, SortOrder};
use quire_extract::models::Book;
use std::cmp::Ordering;

/// Default catalog order: most recently added first, title (ci) breaking
/// ties.
pub(crate) fn default_order(a: &Book, b: &Book) -> Ordering {
    b.added_at.cmp(&a.added_at).then_with(|| title_order(a, b))
}

/// Case-insensitive title order.
pub(crate) fn title_order(a: &Book, b: &Book) -> Ordering {
    a.title.to_lowercase().cmp(&b.title.to_lowercase())
}

/// Comparator for search results under the given query.
pub(crate) fn search_order(query: &SearchQuery) -> impl Fn(&Book, &Book) -> Ordering + '_ {
    move |a, b| match query.sort_by {
        SortBy::SeriesIndex => series_index_key(a)
            .total_cmp(&series_index_key(b))
            .then_with(|| a.series_index.cmp(&b.series_index))
            .then_with(|| title_order(a, b)),
        SortBy::Title => match query.sort_order {
            Some(SortOrder::Desc) => title_order(b, a),
            _ => title_order(a, b),
        },
        SortBy::Added => match query.sort_order {
            Some(SortOrder::Asc) => a.added_at.cmp(&b.added_at).then_with(|| title_order(a, b)),
            _ => default_order(a, b),
        },
    }
}

/// Numeric value of the stored series index text; non-numeric text sorts
/// as zero, with the raw text as tiebreak.
fn series_index_key(book: &Book) -> f64 {
    book.series_index.trim().parse().unwrap_or(0.0)
}

/// Slices a result window out of `items`, returning the page and the
/// unpaginated total. `limit == 0` means no limit.
pub(crate) fn paginate<T: Clone>(items: &[T], offset: usize, limit: usize) -> (Vec<T>, usize) {
    let total = items.len();
    if offset >= total {
        return (Vec::new(), total);
    }
    let end = if limit == 0 { total } else { total.min(offset + limit) };
    (items[offset..end].to_vec(), total)
}

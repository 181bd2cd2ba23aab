//! Translation of list query strings into store queries
//!
//! Every resource declares which keys it filters on; anything else is
//! rejected instead of being silently ignored or turned into an ad hoc
//! filter.

use database_layer::{DocumentQuery, SortKey};

use crate::error::{ApiError, ApiResult};
use crate::handlers::common::resource::Resource;
use crate::types::PaginationParams;

pub const SEARCH_PARAM: &str = "search";
pub const SORT_PARAM: &str = "sort";
pub const PAGE_PARAM: &str = "page";
pub const PAGE_SIZE_PARAM: &str = "page_size";

/// A parsed list request.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub query: DocumentQuery,
    /// Present when the caller asked for a page.
    pub pagination: Option<PaginationParams>,
}

/// Build the store query for `GET /<collection>` from its raw query pairs.
///
/// Empty filter values are ignored so a cleared select box means "all".
pub fn build_list_query<R: Resource>(params: &[(String, String)]) -> ApiResult<ListRequest> {
    let mut query = DocumentQuery::new();
    let mut pagination = PaginationParams::default();
    let mut search: Option<&str> = None;
    let mut sort: Option<&str> = None;

    for (key, value) in params {
        match key.as_str() {
            SEARCH_PARAM => search = Some(value.as_str()),
            SORT_PARAM => sort = Some(value.as_str()),
            PAGE_PARAM => pagination.page = Some(parse_number(key, value)?),
            PAGE_SIZE_PARAM => pagination.page_size = Some(parse_number(key, value)?),
            field if R::FILTERS.contains(&field) => {
                if !value.is_empty() {
                    query = query.filter_eq(field, value.as_str());
                }
            }
            other => {
                return Err(ApiError::bad_request(format!(
                    "Unknown query parameter '{}' for {}; accepted filters: {}",
                    other,
                    R::COLLECTION,
                    R::FILTERS.join(", ")
                )))
            }
        }
    }

    if let Some(term) = search.filter(|t| !t.is_empty()) {
        query = query.search(term, R::SEARCH.iter().copied());
    }

    query = query.order_by(match sort.filter(|s| !s.is_empty()) {
        Some(spec) => parse_sort::<R>(spec)?,
        None => R::default_sort(),
    });

    let pagination = pagination.is_requested().then_some(pagination);
    if let Some(page) = &pagination {
        query = query.window(Some(page.limit()), page.offset());
    }

    Ok(ListRequest { query, pagination })
}

/// `field` sorts ascending, `-field` descending.
fn parse_sort<R: Resource>(spec: &str) -> ApiResult<SortKey> {
    let (field, descending) = match spec.strip_prefix('-') {
        Some(field) => (field, true),
        None => (spec, false),
    };
    if !R::is_sortable(field) {
        return Err(ApiError::bad_request(format!(
            "Cannot sort {} by '{}'",
            R::COLLECTION,
            field
        )));
    }
    Ok(if descending {
        SortKey::desc(field)
    } else {
        SortKey::asc(field)
    })
}

fn parse_number(key: &str, value: &str) -> ApiResult<u32> {
    value
        .parse::<u32>()
        .map_err(|_| ApiError::bad_request(format!("Query parameter '{key}' must be a positive integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::patients::Patients;
    use database_layer::SortDirection;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_filters_and_search() {
        let request = build_list_query::<Patients>(&pairs(&[
            ("status", "active"),
            ("gender", ""),
            ("search", " nguyen "),
        ]))
        .expect("valid query");

        assert_eq!(request.query.filters.len(), 1);
        assert_eq!(request.query.filters[0].field, "status");
        let search = request.query.search.expect("search");
        assert_eq!(search.term, " nguyen ");
        assert!(search.fields.iter().any(|f| f == "fullName"));
        assert!(request.pagination.is_none());
        assert_eq!(request.query.limit, None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = build_list_query::<Patients>(&pairs(&[("favouriteColour", "blue")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_sort_and_pagination() {
        let request = build_list_query::<Patients>(&pairs(&[("sort", "-fullName"), ("page", "2")]))
            .expect("valid query");
        assert_eq!(request.query.sort[0].field, "fullName");
        assert_eq!(request.query.sort[0].direction, SortDirection::Desc);
        assert_eq!(request.query.limit, Some(20));
        assert_eq!(request.query.offset, 20);

        let default = build_list_query::<Patients>(&[]).expect("valid query");
        assert_eq!(default.query.sort[0].field, "createdAt");

        assert!(build_list_query::<Patients>(&pairs(&[("sort", "address")])).is_err());
        assert!(build_list_query::<Patients>(&pairs(&[("page", "abc")])).is_err());
    }
}

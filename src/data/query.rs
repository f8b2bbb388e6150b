//! Browsing helpers for the services view
//!
//! Search, category filtering and "load more" paging over a catalog snapshot.

use super::Service;

/// Number of services shown before the first "load more"
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Number of extra services each "load more" reveals
pub const LOAD_MORE_STEP: usize = 50;

/// Distinct categories in the order they first appear
pub fn categories(services: &[Service]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for service in services {
        if !seen.iter().any(|c| c == &service.category) {
            seen.push(service.category.clone());
        }
    }
    seen
}

/// A filter over the catalog, as typed into the services view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceQuery {
    /// Free-text search against the name or id
    pub search: Option<String>,
    /// Exact category; `None` means all categories
    pub category: Option<String>,
    /// Number of matches to skip
    pub offset: usize,
    /// Number of matches to show
    pub limit: usize,
}

impl Default for ServiceQuery {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPage<'a> {
    /// Matches within the requested window
    pub services: Vec<&'a Service>,
    /// Total number of matches before paging
    pub total: usize,
}

impl QueryPage<'_> {
    /// Whether more matches exist past this page
    pub fn has_more(&self, query: &ServiceQuery) -> bool {
        query.offset + self.services.len() < self.total
    }
}

impl ServiceQuery {
    /// Whether a single service passes the search and category filters
    pub fn matches(&self, service: &Service) -> bool {
        let matches_category = match &self.category {
            Some(category) => &service.category == category,
            None => true,
        };

        let matches_search = match &self.search {
            Some(term) if !term.is_empty() => {
                service.name.to_lowercase().contains(&term.to_lowercase())
                    || service.id.to_string().contains(term.as_str())
            }
            _ => true,
        };

        matches_category && matches_search
    }

    /// Filters the catalog and cuts out the requested page
    pub fn apply<'a>(&self, services: &'a [Service]) -> QueryPage<'a> {
        let matching: Vec<&Service> = services.iter().filter(|s| self.matches(s)).collect();
        let total = matching.len();
        let services = matching
            .into_iter()
            .skip(self.offset)
            .take(self.limit)
            .collect();

        QueryPage { services, total }
    }

    /// The same query widened by one "load more" step
    pub fn next_page(&self) -> Self {
        Self {
            limit: self.limit + LOAD_MORE_STEP,
            ..self.clone()
        }
    }
}

use domain::OrderStatus;

/// Default page size for order listings.
pub const DEFAULT_ORDER_LIMIT: usize = 100;

/// Largest page size a caller may request.
pub const MAX_ORDER_LIMIT: usize = 500;

/// Filter and paging for order listings.
///
/// Results are always ordered by creation time, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only return orders in this status.
    pub status: Option<OrderStatus>,

    /// Maximum number of orders to return. Zero or values above
    /// [`MAX_ORDER_LIMIT`] fall back to [`DEFAULT_ORDER_LIMIT`].
    pub limit: usize,

    /// Number of orders to skip.
    pub offset: usize,
}

impl OrderFilter {
    /// Creates an unfiltered query with the default page size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the listing to one status.
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// The page size actually applied.
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 || self.limit > MAX_ORDER_LIMIT {
            DEFAULT_ORDER_LIMIT
        } else {
            self.limit
        }
    }

    /// The offset as a SQL `BIGINT`, saturating at `i64::MAX`.
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(OrderFilter::new().effective_limit(), 100);
        assert_eq!(OrderFilter::new().with_limit(25).effective_limit(), 25);
        assert_eq!(OrderFilter::new().with_limit(500).effective_limit(), 500);
        assert_eq!(OrderFilter::new().with_limit(501).effective_limit(), 100);
    }

    #[test]
    fn builder_sets_fields() {
        let filter = OrderFilter::new()
            .with_status(OrderStatus::Reserved)
            .with_offset(10);
        assert_eq!(filter.status, Some(OrderStatus::Reserved));
        assert_eq!(filter.offset, 10);
    }

    #[test]
    fn huge_offset_saturates_instead_of_wrapping() {
        assert_eq!(OrderFilter::new().with_offset(40).sql_offset(), 40);
        assert_eq!(OrderFilter::new().with_offset(usize::MAX).sql_offset(), i64::MAX);
    }
}

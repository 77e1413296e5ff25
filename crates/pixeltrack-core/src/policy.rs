use std::time::Duration;

/// Time windows used to suppress duplicate events.
///
/// The category windows were tuned against storefront double-fire patterns
/// (buttons that emit twice, route changes that re-run page hooks). New event
/// categories should not reuse them without similar tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionPolicy {
    /// Default window for identical dedup keys.
    pub dedup_window: Duration,
    /// Ledger entries older than this are swept on every write.
    pub retention: Duration,
    pub add_to_cart_same_product: Duration,
    pub add_to_cart_any: Duration,
    pub page_view_same_page: Duration,
    pub page_view_any: Duration,
    pub lead_same_type: Duration,
    pub lead_any: Duration,
    /// Durable per-path lock for forced page views.
    pub page_view_lock: Duration,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(10),
            retention: Duration::from_secs(5 * 60),
            add_to_cart_same_product: Duration::from_secs(15),
            add_to_cart_any: Duration::from_secs(5),
            page_view_same_page: Duration::from_secs(60),
            page_view_any: Duration::from_secs(30),
            lead_same_type: Duration::from_secs(120),
            lead_any: Duration::from_secs(60),
            page_view_lock: Duration::from_secs(30),
        }
    }
}

/// Milliseconds in `d`, saturating at `i64::MAX`.
#[must_use]
pub fn window_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

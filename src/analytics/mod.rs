//! Redirect analytics
//!
//! Events are recorded per redirect into per-rule, time-bucket and
//! value-count counters. Queries read those counters back through a
//! windowed cache that can serve partial ranges and page windows.

pub mod buckets;
pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod paging;
pub mod recorder;
pub mod service;
pub mod window_cache;

pub use geoip::GeoIpService;
pub use ip_extractor::extract_client_ip;
pub use models::{
    CountRow, Granularity, QueryOutcome, RedirectEvent, SeriesPage, SortDirection, Span,
    ValueCountPage,
};
pub use recorder::{current_minute, EventRecorder, RecordReport};
pub use service::{AnalyticsService, SeriesRequest, ValueCountRequest};
pub use window_cache::{CacheLookup, WindowedCache};

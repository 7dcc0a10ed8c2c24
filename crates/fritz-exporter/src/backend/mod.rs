//! Protocol backends producing raw result records for a list of metrics.

pub mod lua;
pub mod upnp;

use async_trait::async_trait;
use thiserror::Error;
use upnp_core::ResultRecord;

use crate::catalog::MetricSpec;
use crate::error::ExporterError;
use crate::resolve::ResolveError;

pub use lua::LuaBackend;
pub use upnp::UpnpBackend;

/// Error recorded for a single metric; the pass carries on.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("page {page}: {source}")]
    Page {
        page: String,
        #[source]
        source: fritz_lua::LuaError,
    },
}

/// Raw records of one metric together with the errors recorded for it.
#[derive(Debug, Default)]
pub struct MetricOutcome {
    pub records: Vec<ResultRecord>,
    pub errors: Vec<MetricError>,
}

/// A source of raw result records.
///
/// `collect` returns one outcome per metric, in catalog order. An `Err` means
/// the whole pass failed (for instance the login was rejected).
#[async_trait]
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    async fn collect(&mut self, metrics: &[MetricSpec]) -> Result<Vec<MetricOutcome>, ExporterError>;
}

//! FRITZ!Box exporter core: a metric catalog resolved against TR-064 actions
//! or Lua pages, reduced to Prometheus samples.
//!
//! ```rust,no_run
//! use fritz_exporter::{collect_errors_counter, encode_text, Catalog, Collector, ExporterError};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), ExporterError> {
//! let catalog = Catalog::load(Path::new("metrics.json"))?;
//! let errors = collect_errors_counter()?;
//! let mut collector =
//!     Collector::upnp(catalog, "http://fritz.box:49000", None, "fritz.box", errors).await?;
//! let families = collector.gather().await;
//! println!("{}", encode_text(&families)?);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cache;
pub mod catalog;
pub mod collector;
pub mod error;
pub mod extract;
pub mod resolve;

pub use backend::{Backend, LuaBackend, MetricError, MetricOutcome, UpnpBackend};
pub use cache::PassCache;
pub use catalog::{ActionArgSpec, Catalog, LabelRename, MetricSpec, MetricsFile, PromDesc, ValueType};
pub use collector::{
    collect_errors_counter, encode_text, error_families, merge_families, Collector, MetricReport,
    PassReport,
};
pub use error::{CatalogError, ExporterError};
pub use extract::{ExtractError, Sample};
pub use resolve::{resolve_metric, ActionInvoker, Resolution, ResolveError};

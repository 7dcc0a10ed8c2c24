use thiserror::Error;

/// Failure to load or compile a metric catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error compiling regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that stop a collector from being built or a whole pass from running.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("upnp: {0}")]
    Tr064(#[from] tr064::Tr064Error),
    #[error("lua: {0}")]
    Lua(#[from] fritz_lua::LuaError),
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),
}

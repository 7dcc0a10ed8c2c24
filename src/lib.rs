//! Aggregator for the FRITZ!Box exporter workspace.

pub use fritz_exporter as exporter;
pub use fritz_lua as lua;
pub use tr064;
pub use upnp_core as model;
pub use upnp_xml as xml;

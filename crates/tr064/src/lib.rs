//! TR-064 transport: descriptor discovery, Digest authentication and SOAP
//! action invocation against a gateway's UPnP control port.

pub mod client;
pub mod digest;
pub mod survey;

pub use client::{ActionArgument, Credentials, Tr064Client, Tr064Error};
pub use digest::{AuthError, DigestChallenge};
pub use survey::{collect_all, render, SurveyArgument, SurveyEntry};

/// Protocol constants shared by discovery and action calls.
pub mod consts {
    /// Internet gateway device description, fetched first.
    pub const IGD_DESCRIPTION: &str = "igddesc.xml";
    /// TR-064 device description, merged into the first one.
    pub const TR64_DESCRIPTION: &str = "tr64desc.xml";
    /// Content type of SOAP requests.
    pub const CONTENT_TYPE_XML: &str = r#"text/xml; charset="utf-8""#;
    /// Header carrying `<serviceType>#<action>`.
    pub const SOAP_ACTION_HEADER: &str = "SOAPAction";
    pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
    pub const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";
    /// Default UPnP control endpoint of a FRITZ!Box.
    pub const DEFAULT_URL: &str = "http://fritz.box:49000";
}

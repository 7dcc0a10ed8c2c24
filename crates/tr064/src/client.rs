//! SOAP action client with descriptor discovery and cached Digest auth.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use upnp_core::{Action, Device, ModelError, ResultRecord, Service, ServiceIndex};
use upnp_xml::{DeviceDecl, SoapFault, XmlError};

use crate::consts;
use crate::digest::{self, AuthError, DigestChallenge};

#[derive(Debug, Error)]
pub enum Tr064Error {
    #[error("transport: {0}")]
    Transport(String),
    #[error("xml: {0}")]
    Xml(#[from] XmlError),
    #[error("model: {0}")]
    Model(#[from] ModelError),
    #[error("{action}: {source}")]
    Auth {
        action: String,
        #[source]
        source: AuthError,
    },
    #[error("{action}: Unauthorized, but no username and password given")]
    Unauthorized { action: String },
    #[error("{action}: {reason} ({status})")]
    Status {
        action: String,
        status: u16,
        reason: String,
    },
    #[error("{action}: {fault}")]
    Fault { action: String, fault: SoapFault },
    #[error("{action}: {source}")]
    Response {
        action: String,
        #[source]
        source: ModelError,
    },
    #[error("service {0} not found")]
    UnknownService(String),
    #[error("action {action} not found in service {service}")]
    UnknownAction { service: String, action: String },
}

impl From<reqwest::Error> for Tr064Error {
    fn from(err: reqwest::Error) -> Self {
        Tr064Error::Transport(err.to_string())
    }
}

/// Username and password used to answer Digest challenges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Both parts must be non-empty, otherwise the client runs unauthenticated.
    pub fn from_parts(username: &str, password: &str) -> Option<Self> {
        if username.is_empty() || password.is_empty() {
            None
        } else {
            Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            })
        }
    }
}

/// Single scalar input argument of an action call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArgument {
    pub name: String,
    pub value: String,
}

impl ActionArgument {
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
        }
    }
}

/// Client bound to one gateway control endpoint.
///
/// The negotiated `Authorization` header is kept on the instance and sent
/// preemptively until the device answers 401 again.
#[derive(Debug)]
pub struct Tr064Client {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    auth_header: Option<String>,
    services: ServiceIndex,
    device: Device,
}

impl Tr064Client {
    /// Create a client without running discovery.
    ///
    /// For `https://` endpoints the client accepts the self-signed device
    /// certificate.
    pub fn new(base_url: &str, credentials: Option<Credentials>) -> Result<Self, Tr064Error> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let accept_invalid_certs = base_url.starts_with("https://");
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;
        Ok(Self {
            http,
            base_url,
            credentials,
            auth_header: None,
            services: ServiceIndex::new(),
            device: Device::default(),
        })
    }

    /// Create a client and load the service tree.
    pub async fn connect(base_url: &str, credentials: Option<Credentials>) -> Result<Self, Tr064Error> {
        let mut client = Self::new(base_url, credentials)?;
        client.load_services().await?;
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn services(&self) -> &ServiceIndex {
        &self.services
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Currently cached `Authorization` header, if any.
    pub fn auth_header(&self) -> Option<&str> {
        self.auth_header.as_deref()
    }

    /// Fetch both device descriptions and every SCPD, then rebuild the
    /// device tree and the service index. Nothing is replaced on failure.
    pub async fn load_services(&mut self) -> Result<(), Tr064Error> {
        let mut root = self.fetch_description(consts::IGD_DESCRIPTION).await?;
        root.merge(self.fetch_description(consts::TR64_DESCRIPTION).await?);

        let mut index = ServiceIndex::new();
        let mut linked = Vec::new();
        for decl in root.services_depth_first() {
            let url = format!("{}{}", self.base_url, decl.scpd_url);
            let scpd = upnp_xml::parse_scpd(&self.fetch_text(&url).await?)?;
            let service = Service::build(decl, scpd)?;
            index.insert(Arc::clone(&service));
            linked.push(service);
        }

        self.device = Device::assemble(&root, &mut linked.into_iter());
        self.services = index;
        info!(
            url = %self.base_url,
            device = %self.device.info.friendly_name,
            services = self.services.len(),
            "loaded service descriptions"
        );
        Ok(())
    }

    /// Invoke `action_name` of the service registered as `service_type`.
    pub async fn call(
        &mut self,
        service_type: &str,
        action_name: &str,
        argument: Option<&ActionArgument>,
    ) -> Result<ResultRecord, Tr064Error> {
        let service = self
            .services
            .get(service_type)
            .cloned()
            .ok_or_else(|| Tr064Error::UnknownService(service_type.to_string()))?;
        let action = service
            .action(action_name)
            .ok_or_else(|| Tr064Error::UnknownAction {
                service: service_type.to_string(),
                action: action_name.to_string(),
            })?;
        self.invoke(&service, action, argument).await
    }

    /// POST the SOAP envelope for `action`, answering at most one Digest
    /// challenge, and decode the declared output arguments.
    pub async fn invoke(
        &mut self,
        service: &Service,
        action: &Action,
        argument: Option<&ActionArgument>,
    ) -> Result<ResultRecord, Tr064Error> {
        let url = format!("{}{}", self.base_url, service.control_url);
        let soap_action = format!("{}#{}", service.service_type, action.name);
        let body = envelope(&service.service_type, &action.name, argument);
        debug!(%soap_action, argument = ?argument.map(|a| (&a.name, &a.value)), "calling action");

        let mut response = self.post(&url, &soap_action, &body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            let credentials = self.credentials.as_ref().ok_or_else(|| Tr064Error::Unauthorized {
                action: action.name.clone(),
            })?;
            let auth_error = |source: AuthError| Tr064Error::Auth {
                action: action.name.clone(),
                source,
            };
            let challenge = response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| auth_error(AuthError::MissingChallenge))?;
            let header = DigestChallenge::parse(challenge)
                .and_then(|challenge| {
                    challenge.authorize(
                        &credentials.username,
                        &credentials.password,
                        "POST",
                        &service.control_url,
                        &digest::random_cnonce(),
                    )
                })
                .map_err(auth_error)?;
            debug!(action = %action.name, "negotiated digest authorization");
            self.auth_header = Some(header);
            response = self.post(&url, &soap_action, &body).await?;
        }

        let status = response.status();
        let payload = response.bytes().await?;
        trace!(action = %action.name, status = status.as_u16(), bytes = payload.len(), "action response");

        if status != StatusCode::OK {
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                match upnp_xml::parse_soap_fault(&String::from_utf8_lossy(&payload)) {
                    Ok(fault) => {
                        return Err(Tr064Error::Fault {
                            action: action.name.clone(),
                            fault,
                        })
                    }
                    Err(err) => warn!(action = %action.name, error = %err, "undecodable SOAP fault"),
                }
            }
            return Err(Tr064Error::Status {
                action: action.name.clone(),
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        action
            .parse_response(&payload)
            .map_err(|source| Tr064Error::Response {
                action: action.name.clone(),
                source,
            })
    }

    async fn post(&self, url: &str, soap_action: &str, body: &str) -> Result<reqwest::Response, Tr064Error> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, consts::CONTENT_TYPE_XML)
            .header(consts::SOAP_ACTION_HEADER, soap_action)
            .body(body.to_string());
        if let Some(header) = &self.auth_header {
            request = request.header(AUTHORIZATION, header.as_str());
        }
        Ok(request.send().await?)
    }

    async fn fetch_description(&self, path: &str) -> Result<DeviceDecl, Tr064Error> {
        let xml = self.fetch_text(&format!("{}/{}", self.base_url, path)).await?;
        Ok(upnp_xml::parse_device_description(&xml)?)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, Tr064Error> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Tr064Error::Transport(format!("GET {url}: {status}")));
        }
        let text = response.text().await?;
        trace!(%url, bytes = text.len(), "fetched document");
        Ok(text)
    }
}

/// SOAP 1.1 request envelope with zero or one argument element.
pub fn envelope(service_type: &str, action: &str, argument: Option<&ActionArgument>) -> String {
    let argument = argument
        .map(|arg| {
            format!(
                "<{name}>{value}</{name}>",
                name = arg.name,
                value = quick_xml::escape::escape(arg.value.as_str())
            )
        })
        .unwrap_or_default();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="{ns}" s:encodingStyle="{enc}"><s:Body><u:{action} xmlns:u="{service_type}">{argument}</u:{action}></s:Body></s:Envelope>"#,
        ns = consts::SOAP_ENVELOPE_NS,
        enc = consts::SOAP_ENCODING,
    )
}

//! Parse UPnP device descriptions, SCPD documents and SOAP faults using quick-xml.
//!
//! The parsers only produce plain declarations. Linking arguments to state
//! variables and building lookup indexes happens in `upnp-core`.

use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

/// Device node of a description document (`igddesc.xml`, `tr64desc.xml`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDecl {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: String,
    pub model_description: String,
    pub model_name: String,
    pub model_number: String,
    pub model_url: String,
    pub udn: String,
    pub presentation_url: String,
    /// Entries of `<serviceList>`.
    pub services: Vec<ServiceDecl>,
    /// Entries of `<deviceList>`.
    pub devices: Vec<DeviceDecl>,
}

/// Service entry of a device description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDecl {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
}

/// Content of a Service Control Protocol Document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScpdDecl {
    pub actions: Vec<ActionDecl>,
    pub state_variables: Vec<StateVariableDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionDecl {
    pub name: String,
    pub arguments: Vec<ArgumentDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentDecl {
    pub name: String,
    /// Raw direction, `in` or `out`.
    pub direction: String,
    pub related_state_variable: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateVariableDecl {
    pub name: String,
    /// Raw type tag such as `ui4` or `string`.
    pub data_type: String,
    pub default_value: Option<String>,
}

/// SOAP fault returned by a device together with an HTTP 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub fault_code: String,
    pub fault_string: String,
    /// Vendor detail carried in `<detail><UPnPError>`.
    pub upnp_error: Option<UpnpError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpError {
    pub code: i64,
    pub description: String,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.upnp_error {
            Some(err) if self.fault_string == "UPnPError" => write!(
                f,
                "SOAPFault: {} {} ({})",
                self.fault_string, err.code, err.description
            ),
            _ => write!(f, "SOAPFault: {}", self.fault_string),
        }
    }
}

impl DeviceDecl {
    /// Overlay a second description onto this one.
    ///
    /// Non-empty scalar fields of `other` replace ours, service and sub-device
    /// lists are appended.
    pub fn merge(&mut self, other: DeviceDecl) {
        fn overlay(dst: &mut String, src: String) {
            if !src.is_empty() {
                *dst = src;
            }
        }
        overlay(&mut self.device_type, other.device_type);
        overlay(&mut self.friendly_name, other.friendly_name);
        overlay(&mut self.manufacturer, other.manufacturer);
        overlay(&mut self.manufacturer_url, other.manufacturer_url);
        overlay(&mut self.model_description, other.model_description);
        overlay(&mut self.model_name, other.model_name);
        overlay(&mut self.model_number, other.model_number);
        overlay(&mut self.model_url, other.model_url);
        overlay(&mut self.udn, other.udn);
        overlay(&mut self.presentation_url, other.presentation_url);
        self.services.extend(other.services);
        self.devices.extend(other.devices);
    }

    /// Services of the whole tree, depth-first: a node's own services come
    /// before those of its sub-devices.
    pub fn services_depth_first(&self) -> Vec<&ServiceDecl> {
        let mut out = Vec::new();
        collect_services(self, &mut out);
        out
    }

    fn from_element(element: &Element) -> Self {
        let services = element
            .child("serviceList")
            .map(|list| {
                list.children_named("service")
                    .map(ServiceDecl::from_element)
                    .collect()
            })
            .unwrap_or_default();
        let devices = element
            .child("deviceList")
            .map(|list| {
                list.children_named("device")
                    .map(DeviceDecl::from_element)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            device_type: element.child_text("deviceType"),
            friendly_name: element.child_text("friendlyName"),
            manufacturer: element.child_text("manufacturer"),
            manufacturer_url: element.child_text("manufacturerURL"),
            model_description: element.child_text("modelDescription"),
            model_name: element.child_text("modelName"),
            model_number: element.child_text("modelNumber"),
            model_url: element.child_text("modelURL"),
            udn: element.child_text("UDN"),
            presentation_url: element.child_text("presentationURL"),
            services,
            devices,
        }
    }
}

fn collect_services<'a>(device: &'a DeviceDecl, out: &mut Vec<&'a ServiceDecl>) {
    out.extend(device.services.iter());
    for sub in &device.devices {
        collect_services(sub, out);
    }
}

impl ServiceDecl {
    fn from_element(element: &Element) -> Self {
        Self {
            service_type: element.child_text("serviceType"),
            service_id: element.child_text("serviceId"),
            control_url: element.child_text("controlURL"),
            event_sub_url: element.child_text("eventSubURL"),
            scpd_url: element.child_text("SCPDURL"),
        }
    }
}

/// Parse a device description document and return its root `<device>`.
pub fn parse_device_description(xml: &str) -> Result<DeviceDecl, XmlError> {
    let root = parse_tree(xml)?;
    let device = root
        .child("device")
        .ok_or_else(|| XmlError::Invalid(format!("<{}> has no <device> element", root.name)))?;
    Ok(DeviceDecl::from_element(device))
}

/// Parse an SCPD document into its action list and state table.
pub fn parse_scpd(xml: &str) -> Result<ScpdDecl, XmlError> {
    let root = parse_tree(xml)?;
    let actions = root
        .child("actionList")
        .map(|list| {
            list.children_named("action")
                .map(|action| ActionDecl {
                    name: action.child_text("name"),
                    arguments: action
                        .child("argumentList")
                        .map(|args| {
                            args.children_named("argument")
                                .map(|arg| ArgumentDecl {
                                    name: arg.child_text("name"),
                                    direction: arg.child_text("direction"),
                                    related_state_variable: arg
                                        .child_text("relatedStateVariable"),
                                })
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let state_variables = root
        .child("serviceStateTable")
        .map(|table| {
            table
                .children_named("stateVariable")
                .map(|var| StateVariableDecl {
                    name: var.child_text("name"),
                    data_type: var.child_text("dataType"),
                    default_value: var.child("defaultValue").map(|v| v.text.clone()),
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    trace!(
        actions = actions.len(),
        state_variables = state_variables.len(),
        "parsed SCPD"
    );
    Ok(ScpdDecl {
        actions,
        state_variables,
    })
}

/// Parse a SOAP fault envelope (`Envelope/Body/Fault`).
pub fn parse_soap_fault(xml: &str) -> Result<SoapFault, XmlError> {
    let root = parse_tree(xml)?;
    if root.name != "Envelope" {
        return Err(XmlError::Invalid(format!(
            "expected SOAP Envelope, found <{}>",
            root.name
        )));
    }
    let fault = root
        .child("Body")
        .and_then(|body| body.child("Fault"))
        .ok_or_else(|| XmlError::Invalid("SOAP envelope carries no Fault".into()))?;
    let upnp_error = match fault.child("detail").and_then(|d| d.child("UPnPError")) {
        Some(detail) => {
            let raw = detail.child_text("errorCode");
            let code = raw
                .parse()
                .map_err(|err| XmlError::Invalid(format!("invalid errorCode '{raw}': {err}")))?;
            Some(UpnpError {
                code,
                description: detail.child_text("errorDescription"),
            })
        }
        None => None,
    };
    Ok(SoapFault {
        fault_code: fault.child_text("faultcode"),
        fault_string: fault.child_text("faultstring"),
        upnp_error,
    })
}

/// Minimal element tree; namespaces are dropped, only local names are kept.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn open(event: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(event.local_name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    fn child_text(&self, name: &str) -> String {
        self.child(name).map(|c| c.text.clone()).unwrap_or_default()
    }
}

fn parse_tree(xml: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(Element::open(&e)),
            Ok(Event::Empty(e)) => attach(&mut stack, &mut root, Element::open(&e))?,
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| XmlError::Xml("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(top) = stack.last_mut() {
                    let value = text.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                    top.text.push_str(&value);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError::Invalid("document has no root element".into()))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), XmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(XmlError::Invalid("multiple root elements".into()))
    }
}

//! UPnP service model: actions linked to typed state variables, built from
//! the declarations produced by `upnp-xml`.

pub mod response;
pub mod value;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use thiserror::Error;
use tracing::debug;
use upnp_xml::{DeviceDecl, ScpdDecl, ServiceDecl, StateVariableDecl};

pub use value::{DataType, ResultRecord, Value};

/// Error type produced while linking the model or decoding results.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An argument names a state variable missing from the service state table.
    #[error(
        "argument '{argument}' of action '{action}' references unknown state variable '{variable}'"
    )]
    UnknownStateVariable {
        action: String,
        argument: String,
        variable: String,
    },
    /// The state variable carries a type tag we cannot coerce.
    #[error("unknown datatype: {data_type} ({value})")]
    UnknownDataType { data_type: String, value: String },
    /// A numeric value failed to parse.
    #[error("invalid {data_type} value '{value}': {reason}")]
    Parse {
        data_type: String,
        value: String,
        reason: String,
    },
    /// The response token stream had an unexpected shape.
    #[error("invalid SOAP response: {0}")]
    InvalidResponse(String),
    /// The response body is not well-formed XML.
    #[error("xml: {0}")]
    Xml(String),
}

/// Direction of an action argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Only the literal `in` marks an input; everything else is treated as output.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "in" {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// Typed value slot declared in the service state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    pub data_type: DataType,
    pub default_value: Option<String>,
}

impl From<StateVariableDecl> for StateVariable {
    fn from(decl: StateVariableDecl) -> Self {
        Self {
            data_type: DataType::from_tag(&decl.data_type),
            name: decl.name,
            default_value: decl.default_value,
        }
    }
}

/// Action argument linked to its state variable.
#[derive(Debug)]
pub struct Argument {
    pub name: String,
    pub direction: Direction,
    pub related_state_variable: String,
    state_variable: Arc<StateVariable>,
}

impl Argument {
    /// State variable that governs the wire type of this argument.
    pub fn state_variable(&self) -> &StateVariable {
        &self.state_variable
    }
}

/// Invocable action of a service.
#[derive(Debug)]
pub struct Action {
    pub name: String,
    service: Weak<Service>,
    arguments: Vec<Argument>,
    argument_map: HashMap<String, usize>,
}

impl Action {
    /// Arguments in declaration order.
    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    /// Look up an argument by its name.
    pub fn argument(&self, name: &str) -> Option<&Argument> {
        self.argument_map.get(name).map(|&idx| &self.arguments[idx])
    }

    /// Owning service, if it is still alive.
    pub fn service(&self) -> Option<Arc<Service>> {
        self.service.upgrade()
    }

    /// True when the action takes no input and returns at least one value,
    /// i.e. it can be called blindly to query information.
    pub fn is_get_only(&self) -> bool {
        !self.arguments.is_empty()
            && self
                .arguments
                .iter()
                .all(|arg| arg.direction != Direction::In)
    }

    pub(crate) fn output_argument(&self, name: &[u8]) -> Option<&Argument> {
        let name = std::str::from_utf8(name).ok()?;
        self.argument(name)
            .filter(|arg| arg.direction == Direction::Out)
    }
}

/// Service with its actions and state table, shared between the device tree
/// and the flat [`ServiceIndex`].
#[derive(Debug)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
    actions: BTreeMap<String, Action>,
    state_variables: BTreeMap<String, Arc<StateVariable>>,
}

impl Service {
    /// Link the SCPD of a service: index actions and arguments by name and
    /// resolve every argument's state variable.
    pub fn build(decl: &ServiceDecl, scpd: ScpdDecl) -> Result<Arc<Self>, ModelError> {
        let state_variables: BTreeMap<String, Arc<StateVariable>> = scpd
            .state_variables
            .into_iter()
            .map(|var| (var.name.clone(), Arc::new(StateVariable::from(var))))
            .collect();

        let mut linked = Vec::with_capacity(scpd.actions.len());
        for action in scpd.actions {
            let mut arguments = Vec::with_capacity(action.arguments.len());
            for arg in action.arguments {
                let state_variable = state_variables
                    .get(&arg.related_state_variable)
                    .cloned()
                    .ok_or_else(|| ModelError::UnknownStateVariable {
                        action: action.name.clone(),
                        argument: arg.name.clone(),
                        variable: arg.related_state_variable.clone(),
                    })?;
                arguments.push(Argument {
                    direction: Direction::from_tag(&arg.direction),
                    name: arg.name,
                    related_state_variable: arg.related_state_variable,
                    state_variable,
                });
            }
            linked.push((action.name, arguments));
        }

        debug!(
            service = %decl.service_type,
            actions = linked.len(),
            state_variables = state_variables.len(),
            "linked service"
        );

        Ok(Arc::new_cyclic(|weak| {
            let actions = linked
                .into_iter()
                .map(|(name, arguments)| {
                    let argument_map = arguments
                        .iter()
                        .enumerate()
                        .map(|(idx, arg)| (arg.name.clone(), idx))
                        .collect();
                    (
                        name.clone(),
                        Action {
                            name,
                            service: weak.clone(),
                            arguments,
                            argument_map,
                        },
                    )
                })
                .collect();
            Service {
                service_type: decl.service_type.clone(),
                service_id: decl.service_id.clone(),
                control_url: decl.control_url.clone(),
                event_sub_url: decl.event_sub_url.clone(),
                scpd_url: decl.scpd_url.clone(),
                actions,
                state_variables,
            }
        }))
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    /// Actions sorted by name.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn state_variable(&self, name: &str) -> Option<&StateVariable> {
        self.state_variables.get(name).map(|var| var.as_ref())
    }
}

/// Descriptive fields of a device node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
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
}

impl From<&DeviceDecl> for DeviceInfo {
    fn from(decl: &DeviceDecl) -> Self {
        Self {
            device_type: decl.device_type.clone(),
            friendly_name: decl.friendly_name.clone(),
            manufacturer: decl.manufacturer.clone(),
            manufacturer_url: decl.manufacturer_url.clone(),
            model_description: decl.model_description.clone(),
            model_name: decl.model_name.clone(),
            model_number: decl.model_number.clone(),
            model_url: decl.model_url.clone(),
            udn: decl.udn.clone(),
            presentation_url: decl.presentation_url.clone(),
        }
    }
}

/// Device tree node owning its services and sub-devices.
#[derive(Debug, Default)]
pub struct Device {
    pub info: DeviceInfo,
    pub services: Vec<Arc<Service>>,
    pub devices: Vec<Device>,
}

impl Device {
    /// Rebuild the tree shape of `decl`, taking linked services from
    /// `services` in the order of [`DeviceDecl::services_depth_first`].
    pub fn assemble<I>(decl: &DeviceDecl, services: &mut I) -> Self
    where
        I: Iterator<Item = Arc<Service>>,
    {
        let own = services.by_ref().take(decl.services.len()).collect();
        let devices = decl
            .devices
            .iter()
            .map(|sub| Device::assemble(sub, services))
            .collect();
        Self {
            info: DeviceInfo::from(decl),
            services: own,
            devices,
        }
    }

    /// Number of services in the whole tree.
    pub fn service_count(&self) -> usize {
        self.services.len()
            + self
                .devices
                .iter()
                .map(Device::service_count)
                .sum::<usize>()
    }
}

/// Flat `serviceType → Service` lookup built during discovery.
#[derive(Debug, Default, Clone)]
pub struct ServiceIndex {
    services: BTreeMap<String, Arc<Service>>,
}

impl ServiceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service; a later service with the same type replaces the earlier one.
    pub fn insert(&mut self, service: Arc<Service>) {
        self.services.insert(service.service_type.clone(), service);
    }

    pub fn get(&self, service_type: &str) -> Option<&Arc<Service>> {
        self.services.get(service_type)
    }

    /// Services sorted by type.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

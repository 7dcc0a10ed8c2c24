//! Decoding of SOAP action responses into flat result records.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::trace;

use crate::{Action, ModelError, ResultRecord};

impl Action {
    /// Stream a SOAP response body and collect every declared output argument.
    ///
    /// Values are stored under the argument's state-variable name; several
    /// arguments may share one. Elements that are not output arguments of this
    /// action are skipped.
    pub fn parse_response(&self, body: &[u8]) -> Result<ResultRecord, ModelError> {
        let mut reader = Reader::from_reader(body);
        reader.trim_text(true);
        let mut buf = Vec::new();
        let mut value_buf = Vec::new();
        let mut record = ResultRecord::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => {
                    if let Some(argument) = self.output_argument(start.local_name().as_ref()) {
                        let raw = match reader.read_event_into(&mut value_buf) {
                            Ok(Event::Text(text)) => text
                                .unescape()
                                .map_err(|err| ModelError::Xml(err.to_string()))?
                                .into_owned(),
                            Ok(Event::CData(data)) => {
                                String::from_utf8_lossy(&data.into_inner()).into_owned()
                            }
                            Ok(Event::End(_)) => String::new(),
                            Ok(other) => {
                                return Err(ModelError::InvalidResponse(format!(
                                    "unexpected {other:?} inside <{}>",
                                    argument.name
                                )))
                            }
                            Err(err) => return Err(ModelError::Xml(err.to_string())),
                        };
                        value_buf.clear();
                        let variable = argument.state_variable();
                        let value = variable.data_type.coerce(&raw)?;
                        trace!(argument = %argument.name, variable = %variable.name, %value, "decoded output");
                        record.insert(variable.name.clone(), value);
                    }
                }
                Ok(Event::Empty(start)) => {
                    if let Some(argument) = self.output_argument(start.local_name().as_ref()) {
                        let variable = argument.state_variable();
                        record.insert(variable.name.clone(), variable.data_type.coerce("")?);
                    }
                }
                Ok(Event::Eof) => break,
                Err(err) => return Err(ModelError::Xml(err.to_string())),
                _ => {}
            }
            buf.clear();
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{arg, fixture, service_decl, var};
    use crate::{Service, Value};
    use upnp_xml::{ActionDecl, ScpdDecl};

    fn envelope(action: &str, inner: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>
<u:{action}Response xmlns:u="urn:dslforum-org:service:WLANConfiguration:1">
{inner}
</u:{action}Response>
</s:Body>
</s:Envelope>"#
        )
    }

    #[test]
    fn output_is_keyed_by_state_variable() {
        let scpd = ScpdDecl {
            actions: vec![ActionDecl {
                name: "GetFoo".into(),
                arguments: vec![arg("NewFoo", "out", "Foo")],
            }],
            state_variables: vec![var("Foo", "ui4")],
        };
        let service = Service::build(&service_decl(), scpd).expect("build");
        let action = service.action("GetFoo").unwrap();
        let record = action
            .parse_response(envelope("GetFoo", "<NewFoo>42</NewFoo>").as_bytes())
            .expect("parse");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get("Foo"), Some(&Value::UInt(42)));
    }

    #[test]
    fn decodes_mixed_types_and_empty_elements() {
        let service = fixture();
        let action = service.action("GetInfo").unwrap();
        let body = envelope(
            "GetInfo",
            "<NewEnable>1</NewEnable><NewStatus></NewStatus><NewChannel>6</NewChannel><NewUnrelated>x</NewUnrelated>",
        );
        let record = action.parse_response(body.as_bytes()).expect("parse");
        assert_eq!(record.get("Enable"), Some(&Value::Bool(true)));
        assert_eq!(record.get("Status"), Some(&Value::from("")));
        assert_eq!(record.get("Channel"), Some(&Value::UInt(6)));
        assert!(!record.contains_key("Unrelated"));
        assert!(!record.contains_key("NewUnrelated"));

        let record = action
            .parse_response(envelope("GetInfo", "<NewStatus/>").as_bytes())
            .expect("parse self-closing");
        assert_eq!(record.get("Status"), Some(&Value::from("")));
    }

    #[test]
    fn entities_are_unescaped() {
        let service = fixture();
        let action = service.action("GetInfo").unwrap();
        let record = action
            .parse_response(envelope("GetInfo", "<NewStatus>Up &amp; running</NewStatus>").as_bytes())
            .expect("parse");
        assert_eq!(record.get("Status"), Some(&Value::from("Up & running")));
    }

    #[test]
    fn input_arguments_are_not_collected() {
        let service = fixture();
        let action = service.action("GetGenericAssociatedDeviceInfo").unwrap();
        let body = envelope(
            "GetGenericAssociatedDeviceInfo",
            "<NewAssociatedDeviceIndex>3</NewAssociatedDeviceIndex><NewAssociatedDeviceMACAddress>AA:BB</NewAssociatedDeviceMACAddress>",
        );
        let record = action.parse_response(body.as_bytes()).expect("parse");
        assert!(!record.contains_key("AssociatedDeviceIndex"));
        assert_eq!(
            record.get("AssociatedDeviceMACAddress"),
            Some(&Value::from("AA:BB"))
        );
    }

    #[test]
    fn nested_element_after_match_is_invalid() {
        let service = fixture();
        let action = service.action("GetInfo").unwrap();
        let err = action
            .parse_response(envelope("GetInfo", "<NewStatus><b>Up</b></NewStatus>").as_bytes())
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[test]
    fn numeric_parse_failure_fails_the_call() {
        let service = fixture();
        let action = service.action("GetInfo").unwrap();
        let err = action
            .parse_response(envelope("GetInfo", "<NewChannel>auto</NewChannel>").as_bytes())
            .unwrap_err();
        assert!(matches!(err, ModelError::Parse { .. }));
    }
}

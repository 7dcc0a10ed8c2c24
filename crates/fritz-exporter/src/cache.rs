//! Action results memoized for the duration of one collection pass.

use std::collections::HashMap;

use tr064::ActionArgument;
use upnp_core::ResultRecord;

/// Key `service|action`, suffixed with `|name|value` for calls with an argument.
pub fn cache_key(service: &str, action: &str, argument: Option<&ActionArgument>) -> String {
    match argument {
        Some(arg) => format!("{service}|{action}|{}|{}", arg.name, arg.value),
        None => format!("{service}|{action}"),
    }
}

/// Per-pass result cache. Created at the start of a pass and dropped at its end.
#[derive(Debug, Default)]
pub struct PassCache {
    entries: HashMap<String, ResultRecord>,
}

impl PassCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ResultRecord> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: String, record: ResultRecord) {
        self.entries.insert(key, record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_include_argument_name_and_value() {
        assert_eq!(cache_key("S", "GetInfo", None), "S|GetInfo");
        assert_eq!(
            cache_key("S", "GetEntry", Some(&ActionArgument::new("NewIndex", 2))),
            "S|GetEntry|NewIndex|2"
        );
    }
}

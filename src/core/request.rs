use std::{borrow::Cow, collections::BTreeMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit id used when the experiment's unit field is missing from a request
pub const ANONYMOUS_UNIT: &str = "anonymous";

/// Validated pricing request, as far as routing is concerned
///
/// Extra fields of the incoming payload (car brand, license date, ...) are kept in
/// `attributes` so any of them can be nominated as the experiment unit field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub birthdate: NaiveDate,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl RoutingRequest {
    pub fn new(birthdate: NaiveDate, postal_code: impl Into<String>) -> Self {
        Self {
            birthdate,
            postal_code: postal_code.into(),
            request_id: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// String form of a named attribute, `None` when absent or null.
    pub fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "birthdate" => Some(Cow::Owned(self.birthdate.to_string())),
            "postal_code" => Some(Cow::Borrowed(self.postal_code.as_str())),
            "request_id" => self.request_id.as_deref().map(Cow::Borrowed),
            _ => match self.attributes.get(name)? {
                Value::Null => None,
                Value::String(s) => Some(Cow::Borrowed(s.as_str())),
                other => Some(Cow::Owned(other.to_string())),
            },
        }
    }

    /// Sticky unit id for an experiment keyed on `unit_field`.
    pub fn unit_id(&self, unit_field: &str) -> String {
        self.attribute(unit_field)
            .map(Cow::into_owned)
            .unwrap_or_else(|| ANONYMOUS_UNIT.to_string())
    }
}

use crate::{PortError, Value, ValueType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// Declaration of a port, as given by a node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub direction: PortDirection,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<Value>,
}

impl PortSpec {
    /// A required input.
    pub fn input(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            value_type,
            required: true,
            default: None,
        }
    }

    pub fn output(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Output,
            value_type,
            required: false,
            default: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set a default value. An input with a default is never "missing".
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }
}

/// A named, directional data slot holding at most one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    spec: PortSpec,
    value: Option<Value>,
}

impl Port {
    pub fn from_spec(spec: PortSpec) -> Self {
        let value = spec.default.clone();
        Self { spec, value }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn direction(&self) -> PortDirection {
        self.spec.direction
    }

    pub fn value_type(&self) -> &ValueType {
        &self.spec.value_type
    }

    pub fn is_required(&self) -> bool {
        self.spec.required
    }

    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Check `value` against this port's type tag without writing it.
    pub fn check(&self, value: &Value) -> Result<(), PortError> {
        if self.spec.value_type.accepts(value) {
            Ok(())
        } else {
            Err(PortError::TypeMismatch {
                port: self.spec.name.clone(),
                expected: self.spec.value_type.to_string(),
                actual: value.type_name(),
            })
        }
    }

    pub fn set(&mut self, value: Value) -> Result<(), PortError> {
        self.check(&value)?;
        self.value = Some(value);
        Ok(())
    }

    /// Write an optional value; `None` unsets the port.
    pub fn assign(&mut self, value: Option<Value>) -> Result<(), PortError> {
        match value {
            Some(v) => self.set(v),
            None => {
                self.value = None;
                Ok(())
            }
        }
    }

    /// Put back a value this port held before, skipping the type check.
    pub(crate) fn restore(&mut self, value: Option<Value>) {
        self.value = value;
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Restore the declared default.
    pub fn reset(&mut self) {
        self.value = self.spec.default.clone();
    }
}

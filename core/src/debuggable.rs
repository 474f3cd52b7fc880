use std::borrow::Cow;

use crate::types::{Byte, Long};

#[macro_export]
macro_rules! dbgprop_header {
    ($name:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Header)
    };
}

#[macro_export]
macro_rules! dbgprop_bool {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Boolean($val))
    };
}

#[macro_export]
macro_rules! dbgprop_byte_bin {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::ByteBinary($val))
    };
}

#[macro_export]
macro_rules! dbgprop_long {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Long($val))
    };
}

#[macro_export]
macro_rules! dbgprop_enum {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new(
            $name,
            DebuggablePropertyValue::StaticStr($val.clone().into()),
        )
    };
}

#[macro_export]
macro_rules! dbgprop_string {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::String($val))
    };
}

#[macro_export]
macro_rules! dbgprop_group {
    ($name:expr, $val:expr) => {
        DebuggableProperty::new($name, DebuggablePropertyValue::Nested($val))
    };
}

pub type DebuggableProperties = Vec<DebuggableProperty>;

pub struct DebuggableProperty {
    name: Cow<'static, str>,
    value: DebuggablePropertyValue,
}

impl DebuggableProperty {
    pub fn new(name: impl Into<Cow<'static, str>>, value: DebuggablePropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DebuggablePropertyValue {
        &self.value
    }
}

pub enum DebuggablePropertyValue {
    Header,
    Nested(DebuggableProperties),
    Boolean(bool),
    ByteBinary(Byte),
    Long(Long),
    StaticStr(&'static str),
    String(String),
}

pub trait Debuggable {
    fn get_debug_properties(&self) -> DebuggableProperties;
}

//! Representation of bao values
use core::fmt;

use crate::num::Number;

pub use heap::{Heap, Obj, ObjRef};

pub mod heap;

// Values are small and copied freely. Anything bigger lives in the heap.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(Number),
    // Equality on handles is identity, not contents
    Obj(ObjRef),
}

impl Value {
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Only `false` and `nil` are falsy.
    pub fn is_falsy(&self) -> bool {
        matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Values alone cannot print strings, they need the heap that owns them.
    pub fn display<'a>(&self, heap: &'a Heap) -> DisplayValue<'a> {
        DisplayValue { value: *self, heap }
    }
}

pub struct DisplayValue<'a> {
    value: Value,
    heap: &'a Heap,
}

impl<'a> fmt::Display for DisplayValue<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(obj) => write!(f, "{obj}"),
                None => write!(f, "<dangling #{}>", handle.index()),
            },
        }
    }
}

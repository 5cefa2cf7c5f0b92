//! Every heap object a program creates lives in one [`Heap`].
//!
//! Nothing is ever collected: objects stay put until the heap itself is dropped,
//! which happens when the owning [`Vm`](crate::Vm) goes away.

use core::fmt;

/// Handle to an object in a [`Heap`].
///
/// Handles compare by identity: two handles are equal only when they name the
/// same allocation, whatever the objects contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(usize);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Obj {
    String(Box<str>),
}

impl Obj {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
        }
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Obj>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `chars` into a fresh string object. Equal contents still make a
    /// new object each time.
    pub fn alloc_string(&mut self, chars: &str) -> ObjRef {
        self.alloc(Obj::String(Box::from(chars)))
    }

    fn alloc(&mut self, obj: Obj) -> ObjRef {
        let handle = ObjRef(self.objects.len());
        self.objects.push(obj);
        handle
    }

    /// Looks up an object. Handles from another heap may not exist here.
    pub fn get(&self, handle: ObjRef) -> Option<&Obj> {
        self.objects.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &Obj)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(idx, obj)| (ObjRef(idx), obj))
    }
}

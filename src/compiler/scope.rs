//! Compile-time bookkeeping for `let` bindings.
//!
//! Every binding's value lives on the VM's value stack, so a binding is just a
//! name attached to a stack slot that is known while compiling.

/// Most bindings that may be live at once.
pub const MAX_BINDINGS: usize = 256;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Too many variables.")]
pub struct TooManyBindings;

/// A name bound by `let`, valid inside that `let`'s body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'src> {
    pub name: &'src str,
    /// scope depth the binding was introduced at
    pub depth: usize,
    /// stack slot (counted from the bottom) holding the value
    pub slot: usize,
}

/// Live bindings, oldest first, and the current scope depth.
#[derive(Debug, Default)]
pub struct Scopes<'src> {
    bindings: Vec<Binding<'src>>,
    depth: usize,
}

impl<'src> Scopes<'src> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.depth += 1;
    }

    /// Closes the innermost scope and returns how many bindings it dropped.
    pub fn end(&mut self) -> usize {
        self.depth = self.depth.saturating_sub(1);
        let mut dropped = 0;
        while self
            .bindings
            .last()
            .is_some_and(|binding| binding.depth > self.depth)
        {
            self.bindings.pop();
            dropped += 1;
        }
        dropped
    }

    /// Binds `name` at the current depth. Fails once [`MAX_BINDINGS`] are live.
    pub fn define(&mut self, name: &'src str, slot: usize) -> Result<(), TooManyBindings> {
        if self.bindings.len() >= MAX_BINDINGS {
            return Err(TooManyBindings);
        }
        self.bindings.push(Binding {
            name,
            depth: self.depth,
            slot,
        });
        Ok(())
    }

    /// Finds the innermost live binding called `name`.
    pub fn resolve(&self, name: &str) -> Option<&Binding<'src>> {
        self.bindings.iter().rev().find(|binding| binding.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::{Scopes, TooManyBindings, MAX_BINDINGS};
    use assert2::{check, let_assert};

    #[test]
    fn inner_bindings_shadow_outer_ones() {
        let mut scopes = Scopes::new();
        scopes.begin();
        check!(scopes.define("x", 0) == Ok(()));
        scopes.begin();
        check!(scopes.define("x", 3) == Ok(()));

        let_assert!(Some(binding) = scopes.resolve("x"));
        check!(binding.slot == 3);
        check!(binding.depth == 2);

        check!(scopes.end() == 1);
        let_assert!(Some(binding) = scopes.resolve("x"));
        check!(binding.slot == 0);

        check!(scopes.end() == 1);
        check!(scopes.resolve("x").is_none());
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let mut scopes = Scopes::new();
        scopes.begin();
        check!(scopes.define("y", 0) == Ok(()));
        check!(scopes.resolve("x").is_none());
    }

    #[test]
    fn binding_limit() {
        let mut scopes = Scopes::new();
        for slot in 0..MAX_BINDINGS {
            scopes.begin();
            check!(scopes.define("a", slot) == Ok(()));
        }
        scopes.begin();
        check!(scopes.define("a", MAX_BINDINGS) == Err(TooManyBindings));
        let_assert!(Some(binding) = scopes.resolve("a"));
        check!(binding.slot == MAX_BINDINGS - 1);

        // the failed scope still closes cleanly
        check!(scopes.end() == 0);
        check!(scopes.end() == 1);
    }
}

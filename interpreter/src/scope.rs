use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::Error;
use crate::value::Value;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// One frame of the scope chain. Names are stored upper-cased, so lookups are
/// case-insensitive whatever the caller passes in.
#[derive(Debug, Default)]
pub struct Scope {
    enclosing: Option<ScopeRef>,
    values: AHashMap<String, Value>,
}

fn canonical(key: &str) -> String {
    key.to_ascii_uppercase()
}

impl Scope {
    pub(crate) fn new() -> Self {
        Scope {
            enclosing: None,
            values: AHashMap::new(),
        }
    }

    pub(crate) fn with(enclosing: ScopeRef) -> Self {
        Scope {
            enclosing: Some(enclosing),
            values: AHashMap::new(),
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        self.enclosing.is_none()
    }

    /// Binds `key` in this scope, shadowing any outer binding.
    pub(crate) fn define(&mut self, key: &str, value: Value) {
        self.values.insert(canonical(key), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<Value> {
        self.get_canonical(&canonical(key))
    }

    fn get_canonical(&self, key: &str) -> Option<Value> {
        if let Some(val) = self.values.get(key) {
            Some(val.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get_canonical(key)
        } else {
            None
        }
    }

    pub(crate) fn lookup(&self, key: &str) -> Result<Value, Error> {
        self.get(key).ok_or_else(|| Error::undefined(&canonical(key)))
    }

    pub(crate) fn contains_local(&self, key: &str) -> bool {
        self.values.contains_key(&canonical(key))
    }

    pub(crate) fn root(scope: &ScopeRef) -> ScopeRef {
        let mut current = Rc::clone(scope);
        loop {
            let enclosing = current.borrow().enclosing.clone();
            match enclosing {
                Some(enclosing) => current = enclosing,
                None => return current,
            }
        }
    }

    /// Innermost scope along the chain that binds `key`.
    pub(crate) fn owner(scope: &ScopeRef, key: &str) -> Option<ScopeRef> {
        let mut current = Rc::clone(scope);
        loop {
            if current.borrow().contains_local(key) {
                return Some(current);
            }
            let enclosing = current.borrow().enclosing.clone();
            match enclosing {
                Some(enclosing) => current = enclosing,
                None => return None,
            }
        }
    }

    /// Plain assignment: binds in `scope` unless the name is a global that `scope` does not
    /// shadow, in which case the global is updated.
    pub(crate) fn assign(scope: &ScopeRef, key: &str, value: Value) {
        if !scope.borrow().contains_local(key) {
            let root = Scope::root(scope);
            if root.borrow().contains_local(key) {
                root.borrow_mut().define(key, value);
                return;
            }
        }
        scope.borrow_mut().define(key, value);
    }

    /// Rebinds `key` in whichever scope already owns it, falling back to `scope`. Loop
    /// variables and SWAP go through here.
    pub(crate) fn assign_shared(scope: &ScopeRef, key: &str, value: Value) {
        let target = Scope::owner(scope, key).unwrap_or_else(|| Rc::clone(scope));
        target.borrow_mut().define(key, value);
    }
}

use calltree_protocol::SharedStr;
use serde::{Deserialize, Serialize};

/// Opaque handle to an interned function of one call tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: SharedStr,
    pub module: Option<SharedStr>,
}

impl Function {
    pub fn new(name: impl Into<SharedStr>, module: Option<SharedStr>) -> Self {
        Self {
            name: name.into(),
            module,
        }
    }

    /// Name as shown in a view row, optionally as `module!name`.
    pub fn display_name(&self, prepend_module: bool) -> SharedStr {
        match &self.module {
            Some(module) if prepend_module => SharedStr::from(format!("{module}!{}", self.name)),
            _ => self.name.clone(),
        }
    }
}

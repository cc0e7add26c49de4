use std::fmt;

use super::control::Container;

/// A named service inside one cluster namespace.
///
/// Resolved against the live control plane on every lookup; never cached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instance {
    pub prefix: String,
    pub name: String,
}

impl Instance {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
        }
    }

    /// `{prefix}_{name}_`, the start of every container name of this instance.
    pub fn name_prefix(&self) -> String {
        format!("{}_{}_", self.prefix, self.name)
    }

    pub fn matches(&self, container: &Container) -> bool {
        let want = self.name_prefix();
        container
            .names
            .iter()
            .any(|n| n.trim_start_matches('/').starts_with(&want))
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_1", self.prefix, self.name)
    }
}

//! Capability bookkeeping: which names are provided, which scripts wait.

use std::collections::BTreeSet;

use crate::descriptor::ScriptDescriptor;

/// A script held back by requirements nobody has provided yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingScript {
    pub descriptor: ScriptDescriptor,
    pub unmet: BTreeSet<String>,
}

/// The provided set only grows. Pending scripts keep submission order.
#[derive(Debug, Default)]
pub struct Resolver {
    provided: BTreeSet<String>,
    pending: Vec<PendingScript>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor back when it can start now, otherwise parks it.
    pub fn admit(&mut self, descriptor: ScriptDescriptor) -> Option<ScriptDescriptor> {
        let unmet: BTreeSet<String> = descriptor
            .requires
            .difference(&self.provided)
            .cloned()
            .collect();
        if unmet.is_empty() {
            return Some(descriptor);
        }
        tracing::debug!(script = %descriptor, unmet = ?unmet, "script waits for capabilities");
        self.pending.push(PendingScript { descriptor, unmet });
        None
    }

    /// Merge `names` and release every pending script left with nothing
    /// unmet, in submission order.
    pub fn provide<'a, I>(&mut self, names: I) -> Vec<ScriptDescriptor>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut grew = false;
        for name in names {
            grew |= self.provided.insert(name.clone());
        }
        if !grew {
            return Vec::new();
        }

        let provided = &self.provided;
        let mut ready = Vec::new();
        self.pending.retain_mut(|pending| {
            pending.unmet.retain(|name| !provided.contains(name));
            if pending.unmet.is_empty() {
                ready.push(pending.descriptor.clone());
                false
            } else {
                true
            }
        });
        ready
    }

    pub fn provided(&self) -> &BTreeSet<String> {
        &self.provided
    }

    pub fn is_provided(&self, name: &str) -> bool {
        self.provided.contains(name)
    }

    pub fn pending(&self) -> &[PendingScript] {
        &self.pending
    }

    /// Every capability some pending script still waits for.
    pub fn unmet(&self) -> BTreeSet<String> {
        self.pending
            .iter()
            .flat_map(|p| p.unmet.iter().cloned())
            .collect()
    }
}

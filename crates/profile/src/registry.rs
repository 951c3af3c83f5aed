//! Ordered registry of controls.

use crate::control::Control;
use crate::impact::Impact;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Registration error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate control id: {0}")]
    DuplicateControl(String),
}

/// Holds every loaded control in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ControlRegistry {
    controls: Vec<Arc<Control>>,
    index: HashMap<String, usize>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a control. Identifiers must be unique.
    pub fn define(&mut self, control: Control) -> Result<(), RegistryError> {
        if self.index.contains_key(&control.id) {
            return Err(RegistryError::DuplicateControl(control.id));
        }
        debug!(
            "Registered control {} ({} assertions)",
            control.id,
            control.assertions.len()
        );
        self.index.insert(control.id.clone(), self.controls.len());
        self.controls.push(Arc::new(control));
        Ok(())
    }

    /// Every control, in registration order. Each call starts over.
    pub fn all(&self) -> impl Iterator<Item = &Arc<Control>> + Clone + '_ {
        self.controls.iter()
    }

    /// Controls accepted by `predicate`, in registration order.
    pub fn filter<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a Arc<Control>> + 'a
    where
        P: Fn(&Control) -> bool + 'a,
    {
        self.controls.iter().filter(move |c| predicate(c))
    }

    /// Owned selection for handing to the engine.
    pub fn select(&self, filter: &ControlFilter) -> Vec<Arc<Control>> {
        self.filter(|c| filter.matches(c)).cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Control>> {
        self.index.get(id).and_then(|&i| self.controls.get(i))
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

/// Selection criteria for a partial run. Empty criteria select everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlFilter {
    /// Exact control ids.
    pub ids: Vec<String>,
    /// A control matches if it carries any of these tags.
    pub tags: Vec<String>,
    pub min_impact: Option<Impact>,
}

impl ControlFilter {
    pub fn matches(&self, control: &Control) -> bool {
        if !self.ids.is_empty() && !self.ids.iter().any(|id| *id == control.id) {
            return false;
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| control.has_tag(t)) {
            return false;
        }
        match self.min_impact {
            Some(min) => control.impact >= min,
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.tags.is_empty() && self.min_impact.is_none()
    }
}

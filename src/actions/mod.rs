//! Package actions: named operations a manifest asks to run after install.
//!
//! An `Actions/Action` node names its handler with `alias`. Handlers are
//! looked up in an [`ActionRegistry`]; the built-in ones live in
//! [`standard`].

mod runner;
pub mod standard;

use anyhow::Result;
use std::collections::HashMap;

use crate::manifest::XmlElement;
use crate::services::Services;

pub use runner::{ActionOutcome, ActionStatus, run_actions};

/// What a handler can reach while it runs.
pub struct ActionContext<'a> {
    pub package_name: &'a str,
    pub services: Services<'a>,
}

pub trait PackageAction: Send + Sync {
    fn alias(&self) -> &str;

    /// Run the action described by `data`. `Ok(false)` means it declined to do anything.
    fn execute(&self, ctx: &ActionContext<'_>, data: &XmlElement) -> Result<bool>;

    /// Revert what [`execute`](PackageAction::execute) did.
    fn undo(&self, ctx: &ActionContext<'_>, data: &XmlElement) -> Result<bool>;
}

#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Box<dyn PackageAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in action.
    pub fn with_standard_actions() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(standard::AddStringToHtmlElement));
        registry.register(Box::new(standard::RemoveStringFromHtmlElement));
        registry
    }

    /// Register a handler, replacing any previous one with the same alias.
    pub fn register(&mut self, action: Box<dyn PackageAction>) {
        self.actions.insert(action.alias().to_string(), action);
    }

    pub fn get(&self, alias: &str) -> Option<&dyn PackageAction> {
        self.actions.get(alias).map(|a| a.as_ref())
    }

    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        aliases.sort_unstable();
        aliases
    }
}

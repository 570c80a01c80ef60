//! In-process browser state behind [`TabRegistry`] and [`DebuggerBackend`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DebuggerBackend, TabId, TabInfo, TabRegistry};
use crate::error::{DevToolsError, Result};

#[derive(Debug)]
struct BrowserState {
    /// Tab id to committed URL; `None` while the first navigation is pending.
    tabs: BTreeMap<TabId, Option<String>>,
    client_hosts: HashSet<TabId>,
    debugger_available: bool,
    forwarded: Vec<(TabId, String)>,
    scripts: Vec<(TabId, String)>,
}

/// Thread-safe tab list and debugger bookkeeping.
///
/// Forwarded debugger commands and evaluated scripts are recorded rather
/// than executed.
#[derive(Debug)]
pub struct InMemoryBrowser {
    state: Mutex<BrowserState>,
}

impl Default for InMemoryBrowser {
    fn default() -> Self {
        Self {
            state: Mutex::new(BrowserState {
                tabs: BTreeMap::new(),
                client_hosts: HashSet::new(),
                debugger_available: true,
                forwarded: Vec::new(),
                scripts: Vec::new(),
            }),
        }
    }
}

impl InMemoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tab showing `url`.
    pub fn add_tab(&self, id: TabId, url: impl Into<String>) {
        self.state().tabs.insert(id, Some(url.into()));
    }

    /// Add a tab that has not committed a navigation yet.
    pub fn add_loading_tab(&self, id: TabId) {
        self.state().tabs.insert(id, None);
    }

    /// Commit a navigation. Returns `false` for unknown tabs.
    pub fn navigate(&self, id: TabId, url: impl Into<String>) -> bool {
        match self.state().tabs.get_mut(&id) {
            Some(entry) => {
                *entry = Some(url.into());
                true
            }
            None => false,
        }
    }

    /// Remove a tab and any debugger client attached to it.
    pub fn close_tab(&self, id: TabId) -> bool {
        let mut state = self.state();
        state.client_hosts.remove(&id);
        state.tabs.remove(&id).is_some()
    }

    /// Make debugger attach calls fail, as when the renderer is gone.
    pub fn set_debugger_available(&self, available: bool) {
        self.state().debugger_available = available;
    }

    /// Debugger commands received so far, oldest first.
    pub fn forwarded_commands(&self) -> Vec<(TabId, String)> {
        self.state().forwarded.clone()
    }

    /// Scripts evaluated so far, oldest first.
    pub fn evaluated_scripts(&self) -> Vec<(TabId, String)> {
        self.state().scripts.clone()
    }

    fn state(&self) -> MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TabRegistry for InMemoryBrowser {
    fn inspectable_tabs(&self) -> Vec<TabInfo> {
        self.state()
            .tabs
            .iter()
            .filter_map(|(&id, url)| {
                url.as_ref().map(|url| TabInfo {
                    id,
                    url: url.clone(),
                })
            })
            .collect()
    }

    fn contains_tab(&self, id: TabId) -> bool {
        self.state().tabs.contains_key(&id)
    }

    fn evaluate_javascript(&self, id: TabId, script: &str) -> Result<()> {
        let mut state = self.state();
        if !state.tabs.contains_key(&id) {
            return Err(DevToolsError::Debugger(format!("no tab {}", id)));
        }
        state.scripts.push((id, script.to_string()));
        Ok(())
    }
}

impl DebuggerBackend for InMemoryBrowser {
    fn has_client_host(&self, id: TabId) -> bool {
        self.state().client_hosts.contains(&id)
    }

    fn attach(&self, id: TabId) -> Result<()> {
        let mut state = self.state();
        if !state.debugger_available {
            return Err(DevToolsError::Debugger("debugger unavailable".to_string()));
        }
        if !state.tabs.contains_key(&id) {
            return Err(DevToolsError::Debugger(format!("no tab {}", id)));
        }
        if !state.client_hosts.insert(id) {
            return Err(DevToolsError::Debugger(format!(
                "tab {} already has a debugger client",
                id
            )));
        }
        Ok(())
    }

    fn detach(&self, id: TabId) -> Result<()> {
        if self.state().client_hosts.remove(&id) {
            Ok(())
        } else {
            Err(DevToolsError::Debugger(format!("tab {} has no debugger client", id)))
        }
    }

    fn forward_command(&self, id: TabId, command: &str) -> Result<()> {
        let mut state = self.state();
        if !state.client_hosts.contains(&id) {
            return Err(DevToolsError::Debugger(format!("tab {} has no debugger client", id)));
        }
        state.forwarded.push((id, command.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inspectable_tabs_skip_loading() {
        let browser = InMemoryBrowser::new();
        browser.add_tab(5, "http://b/");
        browser.add_loading_tab(3);
        browser.add_tab(2, "http://a/");

        let ids: Vec<TabId> = browser.inspectable_tabs().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 5]);
        assert!(browser.contains_tab(3));

        assert!(browser.navigate(3, "http://c/"));
        assert_eq!(browser.inspectable_tabs().len(), 3);
        assert!(!browser.navigate(9, "http://nowhere/"));
    }

    #[test]
    fn test_attach_lifecycle() {
        let browser = InMemoryBrowser::new();
        browser.add_tab(1, "http://a/");

        assert!(browser.attach(1).is_ok());
        assert!(browser.has_client_host(1));
        assert!(browser.attach(1).is_err());
        assert!(browser.forward_command(1, "{}").is_ok());
        assert!(browser.detach(1).is_ok());
        assert!(browser.detach(1).is_err());
        assert!(browser.forward_command(1, "{}").is_err());
        assert!(browser.attach(2).is_err());

        assert_eq!(browser.forwarded_commands(), vec![(1, "{}".to_string())]);
    }

    #[test]
    fn test_debugger_unavailable() {
        let browser = InMemoryBrowser::new();
        browser.add_tab(1, "http://a/");
        browser.set_debugger_available(false);

        assert!(matches!(browser.attach(1), Err(DevToolsError::Debugger(_))));
    }

    #[test]
    fn test_close_tab_drops_client() {
        let browser = InMemoryBrowser::new();
        browser.add_tab(1, "http://a/");
        browser.attach(1).unwrap();

        assert!(browser.close_tab(1));
        assert!(!browser.has_client_host(1));
        assert!(!browser.contains_tab(1));
        assert!(browser.evaluate_javascript(1, "x").is_err());
    }
}

//! Terminal tab manager
//!
//! Owns the terminal tabs of one workspace. Each tab has its own
//! [`ExecSession`] and [`ActivityTicker`]; tabs are addressed by a numeric id
//! that starts at 1 and is never reused by the same manager.

use std::sync::Arc;
use tracing::{debug, info};

use crate::activity::{ActivityTicker, HeartbeatSender};
use crate::config::{ClusterEndpoint, TerminalConfig};
use crate::session::ExecSession;
use crate::sink::TerminalSink;

/// Tab identifier
pub type TabId = u32;

/// Builds the sink a new tab renders into
pub type SinkFactory = Box<dyn Fn(TabId) -> Arc<dyn TerminalSink> + Send + Sync>;

/// Workspace the heartbeats are attributed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    /// Workspace name
    pub name: String,
    /// Namespace of the workspace
    pub namespace: String,
}

impl WorkspaceRef {
    /// Create a workspace reference
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

/// One terminal tab
pub struct TerminalTab {
    id: TabId,
    session: ExecSession,
    ticker: ActivityTicker,
}

impl TerminalTab {
    /// Tab id
    #[must_use]
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Exec session of this tab
    #[must_use]
    pub fn session(&self) -> &ExecSession {
        &self.session
    }

    /// Mutable exec session, for `open` and `close`
    pub fn session_mut(&mut self) -> &mut ExecSession {
        &mut self.session
    }

    /// Activity ticker of this tab
    #[must_use]
    pub fn ticker(&self) -> &ActivityTicker {
        &self.ticker
    }
}

/// Bounded set of terminal tabs with exactly one active tab
pub struct TerminalSessionManager {
    endpoint: ClusterEndpoint,
    config: TerminalConfig,
    workspace: WorkspaceRef,
    sink_factory: SinkFactory,
    heartbeat: Arc<dyn HeartbeatSender>,
    tabs: Vec<TerminalTab>,
    active: TabId,
    next_id: TabId,
}

impl TerminalSessionManager {
    /// Create a manager holding a single active tab with id 1
    #[must_use]
    pub fn new(
        endpoint: ClusterEndpoint,
        config: TerminalConfig,
        workspace: WorkspaceRef,
        sink_factory: SinkFactory,
        heartbeat: Arc<dyn HeartbeatSender>,
    ) -> Self {
        let mut manager = Self {
            endpoint,
            config,
            workspace,
            sink_factory,
            heartbeat,
            tabs: Vec::new(),
            active: 1,
            next_id: 1,
        };
        let first = manager.new_tab();
        manager.active = first.id;
        manager.tabs.push(first);
        manager
    }

    fn new_tab(&mut self) -> TerminalTab {
        let id = self.next_id;
        self.next_id += 1;
        let sink = (self.sink_factory)(id);
        TerminalTab {
            id,
            session: ExecSession::new(self.endpoint.clone(), self.config.clone(), sink),
            ticker: ActivityTicker::new(
                self.workspace.name.clone(),
                self.workspace.namespace.clone(),
                self.config.heartbeat_interval(),
                self.heartbeat.clone(),
            ),
        }
    }

    /// Add a tab and make it active. Returns `None` at the tab limit.
    pub fn add_tab(&mut self) -> Option<TabId> {
        if self.tabs.len() >= self.config.max_tabs {
            debug!(max_tabs = self.config.max_tabs, "Tab limit reached");
            return None;
        }
        let tab = self.new_tab();
        let id = tab.id;
        self.tabs.push(tab);
        self.active = id;
        info!(tab = id, "Terminal tab added");
        Some(id)
    }

    /// Remove a tab and close its session.
    ///
    /// When the removed tab was active, the previous tab becomes active, or
    /// the last tab when the first one was removed. The last remaining tab
    /// and unknown ids are refused.
    pub fn remove_tab(&mut self, id: TabId) -> bool {
        if self.tabs.len() <= 1 {
            return false;
        }
        let Some(index) = self.position(id) else {
            return false;
        };

        let mut tab = self.tabs.remove(index);
        tab.session.close();

        if self.active == id {
            let next = if index == 0 {
                self.tabs.len() - 1
            } else {
                index - 1
            };
            self.active = self.tabs[next].id;
        }
        info!(tab = id, active = self.active, "Terminal tab removed");
        true
    }

    /// Make a tab active. Sessions of other tabs keep running.
    pub fn set_active(&mut self, id: TabId) -> bool {
        if self.position(id).is_none() {
            return false;
        }
        self.active = id;
        true
    }

    /// Close every session and drop every tab
    pub fn close_all(&mut self) {
        for tab in &mut self.tabs {
            tab.session.close();
        }
        self.tabs.clear();
        info!("All terminal tabs closed");
    }

    /// Ids of all tabs in display order
    #[must_use]
    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|t| t.id).collect()
    }

    /// The active tab, if any tab remains
    #[must_use]
    pub fn active_tab(&self) -> Option<&TerminalTab> {
        self.tab(self.active)
    }

    /// The active tab, mutably
    pub fn active_tab_mut(&mut self) -> Option<&mut TerminalTab> {
        let active = self.active;
        self.tab_mut(active)
    }

    /// Look up a tab
    #[must_use]
    pub fn tab(&self, id: TabId) -> Option<&TerminalTab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    /// Look up a tab mutably
    pub fn tab_mut(&mut self, id: TabId) -> Option<&mut TerminalTab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    /// Number of tabs
    #[must_use]
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Whether every tab has been closed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Workspace the heartbeats go to
    #[must_use]
    pub fn workspace(&self) -> &WorkspaceRef {
        &self.workspace
    }

    fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }
}

impl Drop for TerminalSessionManager {
    fn drop(&mut self) {
        for tab in &mut self.tabs {
            tab.session.close();
        }
    }
}

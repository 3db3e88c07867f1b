//! Debug snapshots for scopes and the tick dispatcher

use crate::scope::ScopeId;
use std::time::Instant;

/// Point-in-time snapshot of one scope node.
#[derive(Debug, Clone)]
pub struct ScopeDebug {
    /// The scope's id.
    pub scope_id: ScopeId,
    /// Optional label given at creation.
    pub label: Option<String>,
    /// When the scope was created (monotonic).
    pub created_at: Instant,
    /// Parent scope id, absent on roots.
    pub parent_scope_id: Option<ScopeId>,
    /// Rendered keys of the instances cached or provided in this scope.
    pub services: Vec<String>,
    /// Number of direct children.
    pub child_scopes: usize,
    /// Instances in this scope plus all descendants.
    pub total_services: usize,
}

/// Point-in-time snapshot of the tick dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDebugInfo {
    /// Registered logic-tick subscribers.
    pub tickables: usize,
    /// Registered fixed-tick subscribers.
    pub fixed_tickables: usize,
    /// Registered render-tick subscribers.
    pub render_tickables: usize,
    /// Whether dispatch is currently suppressed.
    pub paused: bool,
    /// Logic frames dispatched so far.
    pub logic_ticks: u64,
    /// Render frames dispatched so far.
    pub render_ticks: u64,
    /// Live host-signal connections (0, 1 or 2).
    pub connections: usize,
}

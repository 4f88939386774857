//! Hard resource budgets for plans and workers.

/// Structural limits applied to oracle-produced plans and to the planning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanBudget {
    pub max_phases_per_plan: usize,
    pub max_tasks_per_phase: usize,
    pub max_total_phases: usize,
    pub max_planning_iterations: u32,
}

impl Default for PlanBudget {
    fn default() -> Self {
        Self {
            max_phases_per_plan: 4,
            max_tasks_per_phase: 4,
            max_total_phases: 10,
            max_planning_iterations: 3,
        }
    }
}

impl PlanBudget {
    /// Phases the next plan may still use. Never below one, so a follow-up
    /// plan always has room for at least a single phase.
    pub fn remaining_phases(&self, consumed: usize) -> usize {
        self.max_total_phases.saturating_sub(consumed).max(1)
    }

    /// Phase cap for the next governed plan.
    pub fn phase_allowance(&self, consumed: usize) -> usize {
        self.max_phases_per_plan.min(self.remaining_phases(consumed))
    }

    pub fn phase_ceiling_reached(&self, consumed: usize) -> bool {
        consumed >= self.max_total_phases
    }

    pub fn iteration_cap_reached(&self, planning_iteration: u32) -> bool {
        planning_iteration >= self.max_planning_iterations
    }
}

/// Per-task caps for the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLimits {
    pub max_iterations: u32,
    pub max_tool_calls: u32,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_tool_calls: 10,
        }
    }
}

/// Counters a single worker accumulates over the lifetime of its task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounters {
    pub requests: u32,
    pub tool_calls: u32,
}

impl WorkerCounters {
    /// Reserve the next oracle request. Returns `false` once the iteration cap
    /// is spent; the counter never moves past the cap.
    pub fn begin_request(&mut self, limits: &WorkerLimits) -> bool {
        if self.requests >= limits.max_iterations {
            return false;
        }
        self.requests += 1;
        true
    }

    /// How many of `requested` tool calls may still run.
    pub fn tool_allowance(&self, limits: &WorkerLimits, requested: usize) -> usize {
        let left = limits.max_tool_calls.saturating_sub(self.tool_calls) as usize;
        requested.min(left)
    }

    pub fn record_tool_call(&mut self) {
        self.tool_calls += 1;
    }

    pub fn tool_budget_exhausted(&self, limits: &WorkerLimits) -> bool {
        self.tool_calls >= limits.max_tool_calls
    }
}

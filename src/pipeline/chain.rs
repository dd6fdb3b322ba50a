//! Chain driver: runs components once per iteration in dependency order.
//!
//! Each iteration:
//! 1. Advance the iteration counter.
//! 2. Visit components in topological order.
//! 3. Push every message waiting in the component's inbox.
//! 4. Pull until exhausted and fan outputs out to downstream inboxes.
//!
//! Failures are collected into the [`IterationReport`]; the driver keeps
//! going with the remaining components.

use crate::error::{MediaFlowError, Result};
use crate::pipeline::component::Component;
use crate::pipeline::id::{ComponentId, Iteration, LinkId};
use crate::pipeline::message::MediaMessage;

/// A producer→consumer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub id: LinkId,
    pub from: ComponentId,
    pub to: ComponentId,
}

/// A component and the messages waiting for its next push.
struct ComponentSlot {
    component: Box<dyn Component>,
    inbox: Vec<MediaMessage>,
}

/// One failed call during an iteration.
#[derive(Debug)]
pub struct ComponentFailure {
    pub component: ComponentId,
    pub name: String,
    pub error: MediaFlowError,
}

/// Outcome of [`Chain::run_iteration`].
#[derive(Debug)]
pub struct IterationReport {
    pub iteration: Iteration,
    pub pushed: usize,
    pub pulled: usize,
    /// Outputs pulled from components nothing is linked to.
    pub dropped: usize,
    pub failures: Vec<ComponentFailure>,
}

impl IterationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
pub struct Chain {
    components: Vec<ComponentSlot>,
    links: Vec<Link>,
    /// Topological execution order (indices into `components`).
    execution_order: Vec<usize>,
    execution_order_dirty: bool,
    iteration: Iteration,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Building ──

    /// Add an (already initialized) component. Returns its id.
    pub fn add_component(&mut self, component: impl Component + 'static) -> ComponentId {
        self.add_boxed(Box::new(component))
    }

    pub fn add_boxed(&mut self, component: Box<dyn Component>) -> ComponentId {
        let id = ComponentId(self.components.len() as u32);
        tracing::debug!("Added component {} as {:?}", component.name(), id);
        self.components.push(ComponentSlot {
            component,
            inbox: Vec::new(),
        });
        self.execution_order_dirty = true;
        id
    }

    /// Route the outputs of `from` into `to`.
    pub fn link(&mut self, from: ComponentId, to: ComponentId) -> Result<LinkId> {
        for id in [from, to] {
            if id.index() >= self.components.len() {
                return Err(MediaFlowError::config(format!("Invalid component: {:?}", id)));
            }
        }
        if from == to {
            return Err(MediaFlowError::config("Cannot link a component to itself"));
        }
        if self.links.iter().any(|l| l.from == from && l.to == to) {
            return Err(MediaFlowError::config(format!(
                "{:?} is already linked to {:?}",
                from, to
            )));
        }
        if self.would_create_cycle(from, to) {
            return Err(MediaFlowError::config("Adding this link would create a cycle"));
        }

        let id = LinkId(self.links.len() as u32);
        self.links.push(Link { id, from, to });
        self.execution_order_dirty = true;
        tracing::debug!("Linked {:?} -> {:?}", from, to);
        Ok(id)
    }

    /// Whether `to` can already reach `from`.
    fn would_create_cycle(&self, from: ComponentId, to: ComponentId) -> bool {
        let mut visited = vec![false; self.components.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend(
                self.links
                    .iter()
                    .filter(|l| l.from == current)
                    .map(|l| l.to),
            );
        }
        false
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn component(&self, id: ComponentId) -> Option<&dyn Component> {
        self.components.get(id.index()).map(|s| s.component.as_ref())
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut (dyn Component + 'static)> {
        self.components
            .get_mut(id.index())
            .map(|s| s.component.as_mut())
    }

    /// Last iteration run, `Iteration(0)` before the first.
    pub fn current_iteration(&self) -> Iteration {
        self.iteration
    }

    // ── Topological sort (Kahn's algorithm) ──

    fn recompute_execution_order(&mut self) {
        let n = self.components.len();
        let mut in_degree = vec![0u32; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];

        for link in &self.links {
            adj[link.from.index()].push(link.to.index());
            in_degree[link.to.index()] += 1;
        }

        // Lowest index first among ready components, for a stable order.
        let mut queue: Vec<usize> = (0..n).rev().filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(idx) = queue.pop() {
            order.push(idx);
            for &next in adj[idx].iter().rev() {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Chain has a cycle! Only {} of {} components scheduled.",
                order.len(),
                n
            );
        }

        self.execution_order = order;
        self.execution_order_dirty = false;
    }

    pub fn execution_order(&mut self) -> Vec<ComponentId> {
        if self.execution_order_dirty {
            self.recompute_execution_order();
        }
        self.execution_order
            .iter()
            .map(|&i| ComponentId(i as u32))
            .collect()
    }

    // ── Running ──

    /// Run one pass over every component.
    pub fn run_iteration(&mut self) -> IterationReport {
        if self.execution_order_dirty {
            self.recompute_execution_order();
        }
        self.iteration = self.iteration.next();
        let iteration = self.iteration;

        let mut report = IterationReport {
            iteration,
            pushed: 0,
            pulled: 0,
            dropped: 0,
            failures: Vec::new(),
        };

        for pos in 0..self.execution_order.len() {
            let idx = self.execution_order[pos];
            let produced = self.step_component(idx, iteration, &mut report);
            self.fan_out(idx, produced, &mut report);
        }

        if !report.is_clean() {
            tracing::debug!(
                "Iteration {} finished with {} failures",
                iteration,
                report.failures.len()
            );
        }
        report
    }

    fn step_component(
        &mut self,
        idx: usize,
        iteration: Iteration,
        report: &mut IterationReport,
    ) -> Vec<MediaMessage> {
        let slot = &mut self.components[idx];
        let id = ComponentId(idx as u32);

        for message in std::mem::take(&mut slot.inbox) {
            match slot.component.push(iteration, message) {
                Ok(()) => report.pushed += 1,
                Err(error) => report.failures.push(ComponentFailure {
                    component: id,
                    name: slot.component.name().to_string(),
                    error,
                }),
            }
        }

        let mut produced = Vec::new();
        loop {
            match slot.component.pull(iteration) {
                Ok(Some(message)) => produced.push(message),
                Ok(None) => break,
                Err(error) => {
                    report.failures.push(ComponentFailure {
                        component: id,
                        name: slot.component.name().to_string(),
                        error,
                    });
                    break;
                }
            }
        }
        report.pulled += produced.len();
        produced
    }

    fn fan_out(&mut self, from: usize, produced: Vec<MediaMessage>, report: &mut IterationReport) {
        let targets: Vec<usize> = self
            .links
            .iter()
            .filter(|l| l.from.index() == from)
            .map(|l| l.to.index())
            .collect();

        let Some((&last, rest)) = targets.split_last() else {
            if !produced.is_empty() {
                tracing::trace!(
                    "{} outputs of {} have no consumer",
                    produced.len(),
                    self.components[from].component.name()
                );
            }
            report.dropped += produced.len();
            return;
        };

        for message in produced {
            for &to in rest {
                self.components[to].inbox.push(message.duplicate());
            }
            self.components[last].inbox.push(message);
        }
    }

    /// Destroy every initialized component, in execution order.
    pub fn destroy_all(&mut self) -> Vec<ComponentFailure> {
        if self.execution_order_dirty {
            self.recompute_execution_order();
        }
        let mut failures = Vec::new();
        for &idx in &self.execution_order {
            let slot = &mut self.components[idx];
            slot.inbox.clear();
            if !slot.component.is_initialized() {
                continue;
            }
            if let Err(error) = slot.component.destroy() {
                failures.push(ComponentFailure {
                    component: ComponentId(idx as u32),
                    name: slot.component.name().to_string(),
                    error,
                });
            }
        }
        tracing::info!("Chain destroyed after {} iterations", self.iteration.0);
        failures
    }
}

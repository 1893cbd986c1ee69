use crate::types::{Task, TaskFilter, TaskStats, TaskUpdate};
use cadre_core::{CadreError, CadreResult, TaskStatus};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Task ledger with status buckets, dependency gating, and priority ordering.
///
/// Every task id sits in exactly one status bucket; each bucket keeps the
/// order in which tasks entered it.
pub struct TaskQueue {
    tasks: HashMap<Uuid, Task>,
    buckets: BTreeMap<TaskStatus, Vec<Uuid>>,
    next_seq: u64,
}

impl TaskQueue {
    /// An empty ledger.
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
            buckets: TaskStatus::ALL.into_iter().map(|s| (s, Vec::new())).collect(),
            next_seq: 0,
        }
    }

    /// Rebuild a queue from exported tasks, keeping their statuses and
    /// relative order.
    pub fn from_tasks(mut tasks: Vec<Task>) -> CadreResult<Self> {
        tasks.sort_by_key(|t| t.seq);
        let mut queue = Self::new();
        for task in tasks {
            if queue.tasks.contains_key(&task.id) {
                return Err(CadreError::Config(format!("duplicate task id '{}'", task.id)));
            }
            let after = task.seq.checked_add(1).ok_or_else(|| {
                CadreError::Config(format!("task '{}' has an out-of-range sequence", task.id))
            })?;
            queue.next_seq = queue.next_seq.max(after);
            queue.bucket_mut(task.status).push(task.id);
            queue.tasks.insert(task.id, task);
        }
        Ok(queue)
    }

    fn bucket_mut(&mut self, status: TaskStatus) -> &mut Vec<Uuid> {
        self.buckets.entry(status).or_default()
    }

    /// Add `task` as pending. A nil id is replaced with a fresh one.
    pub fn create_task(&mut self, mut task: Task) -> CadreResult<Uuid> {
        if task.id.is_nil() {
            task.id = Uuid::new_v4();
        }
        if self.tasks.contains_key(&task.id) {
            return Err(CadreError::Config(format!("duplicate task id '{}'", task.id)));
        }
        let seq = self.next_seq;
        let next_seq = seq
            .checked_add(1)
            .ok_or_else(|| CadreError::Config("task sequence exhausted".to_string()))?;
        let now = Utc::now();
        task.status = TaskStatus::Pending;
        task.seq = seq;
        task.created_at = now;
        task.updated_at = now;
        self.next_seq = next_seq;

        let id = task.id;
        debug!(task_id = %id, title = %task.title, priority = %task.priority, "Task created");
        self.bucket_mut(TaskStatus::Pending).push(id);
        self.tasks.insert(id, task);
        Ok(id)
    }

    /// Move a task to `status`, recording the fields that status carries.
    pub fn update_status(
        &mut self,
        id: Uuid,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> CadreResult<&Task> {
        let previous = self
            .tasks
            .get(&id)
            .map(|t| t.status)
            .ok_or_else(|| CadreError::not_found("task", id))?;

        self.bucket_mut(previous).retain(|t| *t != id);
        self.bucket_mut(status).push(id);

        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CadreError::not_found("task", id))?;
        let now = Utc::now();
        task.status = status;
        task.updated_at = now;
        if let Some(assignee) = update.assignee {
            task.assignee = Some(assignee);
        }
        match status {
            TaskStatus::InProgress => task.started_at = Some(now),
            TaskStatus::Completed => {
                task.completed_at = Some(now);
                task.result = update.result;
                task.blocked_reason = None;
            }
            TaskStatus::Blocked => task.blocked_reason = update.reason,
            TaskStatus::Pending => {}
        }
        debug!(task_id = %id, from = %previous, to = %status, "Task status changed");
        Ok(task)
    }

    fn dependencies_met(&self, task: &Task) -> bool {
        task.dependencies.iter().all(|dep| {
            self.tasks
                .get(dep)
                .is_some_and(|d| d.status == TaskStatus::Completed)
        })
    }

    /// The most urgent pending task available to `agent_id` whose dependencies
    /// are all completed. Ties keep insertion order.
    pub fn get_next_task(&self, agent_id: Option<&str>) -> Option<&Task> {
        self.buckets
            .get(&TaskStatus::Pending)?
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| t.is_available_to(agent_id) && self.dependencies_met(t))
            .min_by_key(|t| (t.priority, t.seq))
    }

    /// Look up a task by id.
    pub fn get_task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks matching `filter`, in creation order.
    pub fn get_tasks(&self, filter: &TaskFilter) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().filter(|t| filter.matches(t)).collect();
        tasks.sort_by_key(|t| t.seq);
        tasks
    }

    /// Ids in the `status` bucket, in the order they entered it.
    pub fn ids_with_status(&self, status: TaskStatus) -> &[Uuid] {
        self.buckets
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Counts per status and priority, plus how many pending tasks are ready.
    pub fn get_stats(&self) -> TaskStats {
        let mut stats = TaskStats {
            total: self.tasks.len(),
            ..TaskStats::default()
        };
        for status in TaskStatus::ALL {
            stats.by_status.insert(status, self.ids_with_status(status).len());
        }
        for task in self.tasks.values() {
            *stats.by_priority.entry(task.priority).or_default() += 1;
        }
        stats.ready = self
            .ids_with_status(TaskStatus::Pending)
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .filter(|t| self.dependencies_met(t))
            .count();
        stats
    }

    /// Make `id` depend on `depends_on`. Adding an existing edge is a no-op;
    /// an edge that would close a cycle is rejected.
    pub fn add_dependency(&mut self, id: Uuid, depends_on: Uuid) -> CadreResult<()> {
        if id == depends_on {
            return Err(CadreError::Config(format!("task '{id}' cannot depend on itself")));
        }
        if !self.tasks.contains_key(&depends_on) {
            return Err(CadreError::not_found("task", depends_on));
        }
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| CadreError::not_found("task", id))?;
        if task.dependencies.contains(&depends_on) {
            return Ok(());
        }
        task.dependencies.push(depends_on);
        task.updated_at = Utc::now();

        if self.has_cycle() {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.dependencies.retain(|d| *d != depends_on);
            }
            return Err(CadreError::Config(format!(
                "dependency '{id}' -> '{depends_on}' would create a cycle"
            )));
        }
        Ok(())
    }

    /// Drop completed tasks. Returns how many were removed.
    ///
    /// Dependencies on the removed tasks were satisfied, so those edges are
    /// dropped from the remaining tasks as well.
    pub fn clear_completed(&mut self) -> usize {
        let done: HashSet<Uuid> = std::mem::take(self.bucket_mut(TaskStatus::Completed))
            .into_iter()
            .collect();
        for id in &done {
            self.tasks.remove(id);
        }
        for task in self.tasks.values_mut() {
            task.dependencies.retain(|dep| !done.contains(dep));
        }
        done.len()
    }

    /// Remove every task. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.tasks.clear();
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// All tasks in creation order, for export.
    pub fn to_vec(&self) -> Vec<Task> {
        self.get_tasks(&TaskFilter::default())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Check for cycles in the dependency graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashMap::new();
        self.tasks
            .keys()
            .any(|&id| self.dfs_cycle(id, &mut visited))
    }

    fn dfs_cycle(&self, id: Uuid, visited: &mut HashMap<Uuid, u8>) -> bool {
        match visited.get(&id) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        visited.insert(id, 1);
        if let Some(task) = self.tasks.get(&id) {
            for dep in &task.dependencies {
                if self.dfs_cycle(*dep, visited) {
                    return true;
                }
            }
        }
        visited.insert(id, 2);
        false
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

//! Dependency Scheduler: computes the ready set on each poll, respecting
//! priority and propagating dependency failure.

use std::collections::HashSet;

use crate::model::validate::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome<'a> {
    /// The highest-priority ready task to run next.
    Ready(&'a str),
    /// No ready task, but every task has reached a terminal state.
    Done,
    /// No ready task and tasks remain: they are all transitively blocked
    /// by an earlier failure and must be marked `failed`.
    AllRemainingBlocked(&'a [String]),
}

pub struct Scheduler<'a> {
    workflow: &'a Workflow,
}

impl<'a> Scheduler<'a> {
    pub fn new(workflow: &'a Workflow) -> Self {
        Scheduler { workflow }
    }

    /// Tasks that are not yet completed or failed, and whose every
    /// dependency is in `completed` — except that an `optional` task also
    /// treats a `failed` dependency as satisfied, so a dependent marked
    /// optional can still run after what it depends on fails instead of
    /// waiting on it forever.
    fn ready_tasks(&self, completed: &HashSet<String>, failed: &HashSet<String>) -> Vec<&'a str> {
        let mut ready: Vec<&str> = self
            .workflow
            .declaration_order
            .iter()
            .filter(|id| !completed.contains(*id) && !failed.contains(*id))
            .filter(|id| {
                self.workflow
                    .task(id)
                    .map(|task| {
                        task.depends_on.iter().all(|dep| {
                            completed.contains(dep) || (task.optional && failed.contains(dep))
                        })
                    })
                    .unwrap_or(false)
            })
            .map(|id| id.as_str())
            .collect();

        ready.sort_by(|a, b| {
            let pa = self.workflow.task(a).map(|t| t.priority).unwrap_or(1);
            let pb = self.workflow.task(b).map(|t| t.priority).unwrap_or(1);
            pb.cmp(&pa).then_with(|| {
                let ia = self
                    .workflow
                    .declaration_order
                    .iter()
                    .position(|id| id == a)
                    .unwrap_or(usize::MAX);
                let ib = self
                    .workflow
                    .declaration_order
                    .iter()
                    .position(|id| id == b)
                    .unwrap_or(usize::MAX);
                ia.cmp(&ib)
            })
        });

        ready
    }

    /// Tasks not yet completed/failed that have a non-optional dependency
    /// on something that already failed: these can never become ready
    /// and must be poisoned immediately rather than left pending forever.
    pub fn newly_poisoned(&self, completed: &HashSet<String>, failed: &HashSet<String>) -> Vec<&'a str> {
        self.workflow
            .declaration_order
            .iter()
            .filter(|id| !completed.contains(*id) && !failed.contains(*id))
            .filter_map(|id| self.workflow.task(id).map(|t| (id.as_str(), t)))
            .filter(|(_, task)| !task.optional)
            .filter(|(_, task)| task.depends_on.iter().any(|dep| failed.contains(dep)))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn poll(&self, completed: &HashSet<String>, failed: &HashSet<String>) -> PollOutcome<'a> {
        let total = self.workflow.tasks.len();
        if completed.len() + failed.len() >= total {
            return PollOutcome::Done;
        }

        let ready = self.ready_tasks(completed, failed);
        if let Some(next) = ready.first() {
            return PollOutcome::Ready(next);
        }

        // No ready task and tasks remain: everything left is unreachable.
        PollOutcome::AllRemainingBlocked(&self.workflow.declaration_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{load_workflow, MergeStrategy, TaskDefinition, TaskKind, WorkflowDefinition};
    use std::collections::HashMap;

    fn tool(id: &str, deps: &[&str], priority: u8, optional: bool) -> TaskDefinition {
        TaskDefinition {
            task_id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            priority,
            timeout: 300,
            retry: Default::default(),
            optional,
            kind: TaskKind::Tool {
                tool: "echo".to_string(),
                parameters: HashMap::new(),
            },
        }
    }

    fn workflow(tasks: Vec<TaskDefinition>) -> Workflow {
        load_workflow(WorkflowDefinition {
            workflow_id: "wf".to_string(),
            name: "wf".to_string(),
            description: String::new(),
            target: "example.com".to_string(),
            tasks,
            stop_on_failure: false,
            max_parallel_tasks: 4,
        })
        .unwrap()
    }

    #[test]
    fn ready_set_respects_priority_descending() {
        let wf = workflow(vec![tool("low", &[], 1, false), tool("high", &[], 9, false)]);
        let scheduler = Scheduler::new(&wf);
        let outcome = scheduler.poll(&HashSet::new(), &HashSet::new());
        assert_eq!(outcome, PollOutcome::Ready("high"));
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let wf = workflow(vec![tool("first", &[], 5, false), tool("second", &[], 5, false)]);
        let scheduler = Scheduler::new(&wf);
        let outcome = scheduler.poll(&HashSet::new(), &HashSet::new());
        assert_eq!(outcome, PollOutcome::Ready("first"));
    }

    #[test]
    fn blocked_dependency_is_not_ready() {
        let wf = workflow(vec![tool("a", &[], 1, false), tool("b", &["a"], 1, false)]);
        let scheduler = Scheduler::new(&wf);
        let outcome = scheduler.poll(&HashSet::new(), &HashSet::new());
        assert_eq!(outcome, PollOutcome::Ready("a"));
    }

    #[test]
    fn done_when_all_terminal() {
        let wf = workflow(vec![tool("a", &[], 1, false)]);
        let scheduler = Scheduler::new(&wf);
        let mut completed = HashSet::new();
        completed.insert("a".to_string());
        assert_eq!(scheduler.poll(&completed, &HashSet::new()), PollOutcome::Done);
    }

    #[test]
    fn non_optional_dependent_of_failed_is_poisoned() {
        let wf = workflow(vec![tool("x", &[], 1, false), tool("y", &["x"], 1, false)]);
        let scheduler = Scheduler::new(&wf);
        let mut failed = HashSet::new();
        failed.insert("x".to_string());
        let poisoned = scheduler.newly_poisoned(&HashSet::new(), &failed);
        assert_eq!(poisoned, vec!["y"]);
    }

    #[test]
    fn optional_dependent_of_failed_is_not_poisoned() {
        let wf = workflow(vec![tool("x", &[], 1, false), tool("y", &["x"], 1, true)]);
        let scheduler = Scheduler::new(&wf);
        let mut failed = HashSet::new();
        failed.insert("x".to_string());
        let poisoned = scheduler.newly_poisoned(&HashSet::new(), &failed);
        assert!(poisoned.is_empty());
    }

    #[test]
    fn optional_dependent_of_failed_becomes_ready() {
        let wf = workflow(vec![tool("u", &[], 1, false), tool("v", &["u"], 1, true)]);
        let scheduler = Scheduler::new(&wf);
        let mut failed = HashSet::new();
        failed.insert("u".to_string());
        let outcome = scheduler.poll(&HashSet::new(), &failed);
        assert_eq!(outcome, PollOutcome::Ready("v"));
    }
}

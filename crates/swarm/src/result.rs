//! Aggregate result of a swarm run

use crate::task::{AgentTask, TaskId, TaskStatus};
use serde::Serialize;
use std::time::Duration;

/// Every task of a run, in completion order, plus counters
///
/// `successful_count + failed_count == tasks.len()` and every task is in a
/// terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmResult {
    pub tasks: Vec<AgentTask>,
    pub total_duration: Duration,
    pub successful_count: usize,
    pub failed_count: usize,
    pub synthesis_doc_id: Option<String>,
}

impl SwarmResult {
    pub(crate) fn new(
        tasks: Vec<AgentTask>,
        total_duration: Duration,
        synthesis_doc_id: Option<String>,
    ) -> Self {
        debug_assert!(tasks.iter().all(|t| t.status().is_terminal()));
        let successful_count = tasks
            .iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .count();
        let failed_count = tasks.len() - successful_count;
        Self {
            tasks,
            total_duration,
            successful_count,
            failed_count,
            synthesis_doc_id,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count == 0
    }

    pub fn task(&self, id: &TaskId) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.id() == *id)
    }

    /// First task whose prompt matches exactly
    pub fn task_for_prompt(&self, prompt: &str) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.prompt() == prompt)
    }

    pub fn completed(&self) -> impl Iterator<Item = &AgentTask> {
        self.tasks.iter().filter(|t| t.is_completed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &AgentTask> {
        self.tasks.iter().filter(|t| t.is_failed())
    }

    /// Sum of reported agent cost, if any task reported one
    pub fn total_cost_usd(&self) -> Option<f64> {
        self.tasks
            .iter()
            .filter_map(|t| t.usage().and_then(|u| u.cost_usd))
            .reduce(|a, b| a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TokenUsage;

    fn finished(prompt: &str, ok: bool, cost: Option<f64>) -> AgentTask {
        let mut task = AgentTask::new(prompt);
        task.start();
        task.set_usage(cost.map(|c| TokenUsage {
            cost_usd: Some(c),
            ..Default::default()
        }));
        if ok {
            task.complete(format!("{prompt} done"), None);
        } else {
            task.fail("nope");
        }
        task
    }

    #[test]
    fn counts_add_up() {
        let result = SwarmResult::new(
            vec![
                finished("a", true, Some(0.5)),
                finished("b", false, None),
                finished("c", true, Some(0.25)),
            ],
            Duration::from_secs(3),
            None,
        );

        assert_eq!(result.successful_count, 2);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.successful_count + result.failed_count, result.len());
        assert!(!result.all_succeeded());
        assert_eq!(result.task_for_prompt("b").unwrap().error(), Some("nope"));
        assert_eq!(result.completed().count(), 2);
        assert_eq!(result.total_cost_usd(), Some(0.75));
    }

    #[test]
    fn lookup_by_id() {
        let task = finished("a", true, None);
        let id = task.id();
        let result = SwarmResult::new(vec![task], Duration::ZERO, None);

        assert_eq!(result.task(&id).unwrap().prompt(), "a");
        assert_eq!(result.total_cost_usd(), None);
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use db::models::workspace::Workspace;
use uuid::Uuid;

/// One task whose assignee changed between two snapshots of the same
/// workspace aggregate. Each change maps to exactly one email dispatch
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentChange {
    pub task_id: Uuid,
    pub task_title: String,
    pub old_assignee: String,
    pub new_assignee: String,
    pub due_date: Option<DateTime<Utc>>,
}

/// Compares pre-write and post-write snapshots and yields a change for
/// every task whose trimmed assignee is non-empty and differs from the old
/// value. A task id missing from the old tree counts as previously
/// unassigned, so newly created tasks with an assignee fire too.
/// Unassignment (new value empty) never fires.
///
/// Correctness rests on task ids staying stable across the full-tree
/// replacement: a client that regenerates ids makes every assigned task
/// look newly assigned.
pub fn assignment_changes<'a>(
    old: &'a Workspace,
    new: &'a Workspace,
) -> impl Iterator<Item = AssignmentChange> + 'a {
    let old_assignees: HashMap<Uuid, &'a str> = old
        .tasks()
        .map(|task| (task.id, task.assigned_to.trim()))
        .collect();

    new.tasks().filter_map(move |task| {
        let new_assignee = task.assigned_to.trim();
        if new_assignee.is_empty() {
            return None;
        }
        let old_assignee = old_assignees.get(&task.id).copied().unwrap_or("");
        if new_assignee == old_assignee {
            return None;
        }
        Some(AssignmentChange {
            task_id: task.id,
            task_title: task.title.clone(),
            old_assignee: old_assignee.to_string(),
            new_assignee: new_assignee.to_string(),
            due_date: task.end_date,
        })
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::workspace::{Goal, Milestone, Priority, Task, Workspace};

    use super::*;

    fn task(id: Uuid, title: &str, assigned_to: &str) -> Task {
        Task {
            id,
            title: title.to_string(),
            status: "Not Started".to_string(),
            assigned_to: assigned_to.to_string(),
            user_stories: String::new(),
            start_date: None,
            end_date: None,
            attachments: Vec::new(),
        }
    }

    fn workspace(tasks: Vec<Task>) -> Workspace {
        let now = Utc::now();
        Workspace {
            id: Uuid::new_v4(),
            name: "WS".to_string(),
            owner: None,
            members: Vec::new(),
            goals: vec![Goal {
                id: Uuid::new_v4(),
                title: "Goal".to_string(),
                priority: Priority::Medium,
                milestones: vec![Milestone {
                    id: Uuid::new_v4(),
                    title: "Milestone".to_string(),
                    tasks,
                }],
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unchanged_assignee_emits_nothing() {
        let id = Uuid::new_v4();
        let old = workspace(vec![task(id, "T1", "alice")]);
        let new = workspace(vec![task(id, "T1", "alice")]);
        assert_eq!(assignment_changes(&old, &new).count(), 0);
    }

    #[test]
    fn whitespace_only_differences_emit_nothing() {
        let id = Uuid::new_v4();
        let old = workspace(vec![task(id, "T1", "alice")]);
        let new = workspace(vec![task(id, "T1", "  alice  ")]);
        assert_eq!(assignment_changes(&old, &new).count(), 0);
    }

    #[test]
    fn newly_created_task_with_assignee_fires_with_empty_old_value() {
        let id = Uuid::new_v4();
        let old = workspace(vec![]);
        let new = workspace(vec![task(id, "T1", "bob")]);

        let changes: Vec<_> = assignment_changes(&old, &new).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].task_id, id);
        assert_eq!(changes[0].old_assignee, "");
        assert_eq!(changes[0].new_assignee, "bob");
    }

    #[test]
    fn reassignment_fires_once_with_both_values() {
        let id = Uuid::new_v4();
        let old = workspace(vec![task(id, "T1", "alice")]);
        let new = workspace(vec![task(id, "T1", "bob")]);

        let changes: Vec<_> = assignment_changes(&old, &new).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_assignee, "alice");
        assert_eq!(changes[0].new_assignee, "bob");
    }

    #[test]
    fn unassignment_never_fires() {
        let id = Uuid::new_v4();
        let old = workspace(vec![task(id, "T1", "alice")]);
        let new = workspace(vec![task(id, "T1", "")]);
        assert_eq!(assignment_changes(&old, &new).count(), 0);
    }

    #[test]
    fn due_date_rides_along_with_the_change() {
        let id = Uuid::new_v4();
        let due = Utc::now();
        let old = workspace(vec![]);
        let mut assigned = task(id, "T1", "bob");
        assigned.end_date = Some(due);
        let new = workspace(vec![assigned]);

        let changes: Vec<_> = assignment_changes(&old, &new).collect();
        assert_eq!(changes[0].due_date, Some(due));
    }

    #[test]
    fn multiple_tasks_to_the_same_assignee_fire_individually() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let old = workspace(vec![task(a, "T1", ""), task(b, "T2", "")]);
        let new = workspace(vec![task(a, "T1", "carol"), task(b, "T2", "carol")]);
        assert_eq!(assignment_changes(&old, &new).count(), 2);
    }

    // Known fragility of whole-tree replacement: a client that regenerates
    // task ids makes an unchanged assignee look newly assigned.
    #[test]
    fn regenerated_task_ids_cause_false_positives() {
        let old = workspace(vec![task(Uuid::new_v4(), "T1", "alice")]);
        let new = workspace(vec![task(Uuid::new_v4(), "T1", "alice")]);

        let changes: Vec<_> = assignment_changes(&old, &new).collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_assignee, "");
        assert_eq!(changes[0].new_assignee, "alice");
    }
}

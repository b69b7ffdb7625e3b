use db::models::workspace::Workspace;

use super::auth::Caller;

/// Operations gated per-workspace. Admin read endpoints are gated
/// separately on `Caller::is_admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceAction {
    View,
    EditGoals,
    AddMember,
    Delete,
}

/// Pure decision function. The rule set is deliberate: any member may edit
/// the goal tree, only the owner or an admin manages membership and
/// deletion.
pub fn check(caller: &Caller, workspace: &Workspace, action: WorkspaceAction) -> bool {
    if caller.is_admin() || workspace.is_owner(&caller.email) {
        return true;
    }
    match action {
        WorkspaceAction::View | WorkspaceAction::EditGoals => workspace.is_member(&caller.email),
        WorkspaceAction::AddMember | WorkspaceAction::Delete => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use db::models::user::UserRole;
    use uuid::Uuid;

    use super::*;

    fn workspace(owner: &str, members: &[&str]) -> Workspace {
        let now = Utc::now();
        Workspace {
            id: Uuid::new_v4(),
            name: "WS".to_string(),
            owner: Some(owner.to_string()),
            members: members.iter().map(|m| m.to_string()).collect(),
            goals: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn caller(email: &str, role: UserRole) -> Caller {
        Caller {
            email: email.to_string(),
            role,
        }
    }

    #[test]
    fn admin_may_do_everything() {
        let ws = workspace("owner@x.com", &["owner@x.com"]);
        let admin = caller("root@x.com", UserRole::Admin);
        for action in [
            WorkspaceAction::View,
            WorkspaceAction::EditGoals,
            WorkspaceAction::AddMember,
            WorkspaceAction::Delete,
        ] {
            assert!(check(&admin, &ws, action));
        }
    }

    #[test]
    fn owner_may_do_everything() {
        let ws = workspace("owner@x.com", &["owner@x.com", "m@x.com"]);
        let owner = caller("owner@x.com", UserRole::User);
        assert!(check(&owner, &ws, WorkspaceAction::Delete));
        assert!(check(&owner, &ws, WorkspaceAction::AddMember));
        assert!(check(&owner, &ws, WorkspaceAction::EditGoals));
    }

    #[test]
    fn member_edits_tasks_but_does_not_manage_the_workspace() {
        let ws = workspace("owner@x.com", &["owner@x.com", "m@x.com"]);
        let member = caller("m@x.com", UserRole::User);
        assert!(check(&member, &ws, WorkspaceAction::View));
        assert!(check(&member, &ws, WorkspaceAction::EditGoals));
        assert!(!check(&member, &ws, WorkspaceAction::AddMember));
        assert!(!check(&member, &ws, WorkspaceAction::Delete));
    }

    #[test]
    fn outsider_is_denied_everything() {
        let ws = workspace("owner@x.com", &["owner@x.com"]);
        let outsider = caller("stranger@x.com", UserRole::User);
        for action in [
            WorkspaceAction::View,
            WorkspaceAction::EditGoals,
            WorkspaceAction::AddMember,
            WorkspaceAction::Delete,
        ] {
            assert!(!check(&outsider, &ws, action));
        }
    }
}
